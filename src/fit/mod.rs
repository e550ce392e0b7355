//! Fit configuration and execution.
//!
//! Responsibilities:
//!
//! - validate fit settings into a `FitRequest` (`config`)
//! - estimate per-point variances for weighted fits (`variance`)
//! - solve the nonlinear least-squares problem (`optimizer`, `lbfgs`)
//! - run the fit lifecycle of a page (`page`)

pub mod config;
pub mod lbfgs;
pub mod optimizer;
pub mod page;
pub mod variance;

pub use config::*;
pub use lbfgs::*;
pub use optimizer::*;
pub use page::*;
pub use variance::*;
