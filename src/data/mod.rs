//! Preparation of measured data before fitting.
//!
//! - channel selection (`crop`)
//! - background correction and trace averages (`background`)
//! - synthetic measurements (`simulate`)

pub mod background;
pub mod crop;
pub mod simulate;

pub use background::*;
pub use crop::*;
pub use simulate::*;
