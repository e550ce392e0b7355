//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measured curves and crop windows (`Series`, `CropInterval`)
//! - fit parameters and weighting (`ParameterSet`, `WeightingMode`)
//! - fit outputs (`FitResult`) and run configuration (`FitConfig`)

pub mod types;

pub use types::*;
