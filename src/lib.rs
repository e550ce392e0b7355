//! `fcs-fit` library crate.
//!
//! Preparation and weighted fitting of fluorescence correlation spectroscopy
//! (FCS) curves: channel cropping, background correction, local-variance
//! weights and a Levenberg–Marquardt optimizer behind a small trait.
//!
//! The binary (`fcsfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable from other front-ends

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
