//! Mathematical utilities: least squares, regression splines and lag-time grids.

pub mod grid;
pub mod ols;
pub mod spline;

pub use grid::*;
pub use ols::*;
pub use spline::*;
