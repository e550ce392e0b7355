//! Read/write curve JSON files.
//!
//! Curve JSON is the portable record of one fitted page:
//! - model id + parameters with their fit flags
//! - fit settings (interval, weighting, background correction)
//! - the cropped experimental curve, the model curve and the residuals

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Background, BackgroundTable, CropInterval, WeightingMode};
use crate::error::AppError;
use crate::fit::page::{CurveView, Page};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveParameter {
    pub name: String,
    pub value: f64,
    pub fit: bool,
}

/// Curves on the fitted lag times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub tau_ms: Vec<f64>,
    /// Background-corrected measurement; empty for model-only pages.
    pub experimental: Vec<f64>,
    pub model: Vec<f64>,
    pub residuals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub version: String,
    pub created: DateTime<Utc>,
    pub page: usize,
    pub title: String,
    pub model_id: u32,
    pub model_name: String,
    pub parameters: Vec<CurveParameter>,
    pub chi_squared: Option<f64>,
    pub interval: Option<CropInterval>,
    pub weighting: WeightingMode,
    pub window_halfwidth: usize,
    pub background: Option<Background>,
    pub correction_factor: f64,
    pub grid: CurveGrid,
}

impl CurveFile {
    /// Snapshot a page and its refreshed curves.
    pub fn from_page(page: &Page, view: &CurveView, backgrounds: &BackgroundTable) -> Self {
        let params = page.parameters();
        let parameters = params
            .names()
            .iter()
            .zip(params.values())
            .zip(params.fit_mask())
            .map(|((name, value), fit)| CurveParameter {
                name: name.clone(),
                value: *value,
                fit: *fit,
            })
            .collect();

        let grid = CurveGrid {
            tau_ms: view.model.x().to_vec(),
            experimental: view.experimental.as_ref().map(|s| s.y().to_vec()).unwrap_or_default(),
            model: view.model.y().to_vec(),
            residuals: view.residuals.as_ref().map(|s| s.y().to_vec()).unwrap_or_default(),
        };

        Self {
            tool: "fcs-fit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Utc::now(),
            page: page.counter,
            title: page.title.clone(),
            model_id: page.model.id(),
            model_name: page.model.display_name().to_string(),
            parameters,
            chi_squared: page.chi2(),
            interval: view.interval,
            weighting: page.weighting,
            window_halfwidth: page.window_halfwidth,
            background: page.background.and_then(|i| backgrounds.get(i)).cloned(),
            correction_factor: view.correction.factor,
            grid,
        }
    }
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create curve JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::new(2, format!("Failed to write curve JSON: {e}")))?;
    Ok(())
}

/// Read a curve JSON file.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curve: CurveFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    Ok(curve)
}
