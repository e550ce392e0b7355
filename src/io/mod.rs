//! Input/output helpers.
//!
//! - two-column curve/trace ingest (`ingest`)
//! - statistics table and series exports (`export`)
//! - curve JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
