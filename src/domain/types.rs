//! Shared domain types.
//!
//! This module defines:
//!
//! - measured curves (`Series`) and the channel window used for fitting (`CropInterval`)
//! - fit parameters (`ParameterSet`) and the weighting scheme (`WeightingMode`)
//! - background count rates (`Background`, `BackgroundTable`)
//! - fit outputs (`FitResult`)
//! - a full run's configuration (`FitConfig`)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::models::ModelKind;

/// An ordered sequence of `(x, y)` pairs with strictly increasing `x`.
///
/// For correlation curves `x` is the lag time τ in ms and `y` is G(τ). For
/// intensity traces `x` is the acquisition time and `y` the count rate in kHz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Series {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, FitError> {
        if x.len() != y.len() {
            return Err(FitError::InvalidSeries(format!(
                "{} x values but {} y values",
                x.len(),
                y.len()
            )));
        }
        if let Some(i) = x.iter().position(|v| !v.is_finite()) {
            return Err(FitError::InvalidSeries(format!("non-finite x value at index {i}")));
        }
        if let Some(i) = x.windows(2).position(|w| w[1] <= w[0]) {
            return Err(FitError::InvalidSeries(format!(
                "x values must be strictly increasing (index {})",
                i + 1
            )));
        }
        Ok(Self { x, y })
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, FitError> {
        let (x, y) = pairs.iter().copied().unzip();
        Self::new(x, y)
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    /// Copy of the channels `start..end`. Callers must pass a valid range.
    pub(crate) fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            x: self.x[start..end].to_vec(),
            y: self.y[start..end].to_vec(),
        }
    }

    /// New series with every `y` multiplied by `factor`.
    pub(crate) fn scale_y(&self, factor: f64) -> Self {
        Self {
            x: self.x.clone(),
            y: self.y.iter().map(|v| v * factor).collect(),
        }
    }

    /// New series with the same `x` and the given `y` values.
    pub(crate) fn with_y(&self, y: Vec<f64>) -> Self {
        debug_assert_eq!(y.len(), self.x.len());
        Self { x: self.x.clone(), y }
    }
}

/// Channel window `[start, end)` of a full series.
///
/// `start == end` is the "unset" sentinel and means the full range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropInterval {
    pub start: usize,
    pub end: usize,
}

impl CropInterval {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The full range of a series with `len` channels.
    pub fn full(len: usize) -> Self {
        Self { start: 0, end: len }
    }

    pub fn is_unset(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for CropInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Model parameters with the flags that say which of them the optimizer may vary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    names: Vec<String>,
    values: Vec<f64>,
    fit_mask: Vec<bool>,
}

impl ParameterSet {
    pub fn new(names: Vec<String>, values: Vec<f64>, fit_mask: Vec<bool>) -> Result<Self, FitError> {
        if names.len() != values.len() || values.len() != fit_mask.len() {
            return Err(FitError::ParameterMismatch {
                names: names.len(),
                values: values.len(),
                mask: fit_mask.len(),
            });
        }
        Ok(Self {
            names,
            values,
            fit_mask,
        })
    }

    /// The model's label table, default values and default fit flags.
    pub fn defaults(model: ModelKind) -> Self {
        Self {
            names: model.parameter_labels().iter().map(|s| s.to_string()).collect(),
            values: model.default_values(),
            fit_mask: model.default_fit_mask(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn fit_mask(&self) -> &[bool] {
        &self.fit_mask
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of parameters the optimizer is allowed to vary.
    pub fn free_count(&self) -> usize {
        self.fit_mask.iter().filter(|f| **f).count()
    }

    /// Names of the varied parameters, in parameter order.
    pub fn free_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .zip(&self.fit_mask)
            .filter(|(_, fit)| **fit)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Replace all values. The length must not change.
    pub fn set_values(&mut self, values: Vec<f64>) -> Result<(), FitError> {
        if values.len() != self.values.len() {
            return Err(FitError::ParameterMismatch {
                names: self.names.len(),
                values: values.len(),
                mask: self.fit_mask.len(),
            });
        }
        self.values = values;
        Ok(())
    }

    /// Replace the fit flags. The length must not change.
    pub fn set_fit_mask(&mut self, fit_mask: Vec<bool>) -> Result<(), FitError> {
        if fit_mask.len() != self.values.len() {
            return Err(FitError::ParameterMismatch {
                names: self.names.len(),
                values: self.values.len(),
                mask: fit_mask.len(),
            });
        }
        self.fit_mask = fit_mask;
        Ok(())
    }
}

/// Spline knot count used when a spline weighting suffix cannot be parsed.
pub const DEFAULT_SPLINE_KNOTS: usize = 5;

/// How per-point variances are estimated for a weighted fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightingMode {
    /// Unweighted least squares.
    None,
    /// Variance of residuals against a cubic regression spline with `knots` knots.
    Spline { knots: usize },
    /// Variance of residuals against the model at its initial parameters.
    ModelFunction,
}

impl WeightingMode {
    pub fn is_weighted(self) -> bool {
        !matches!(self, WeightingMode::None)
    }
}

impl fmt::Display for WeightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingMode::None => write!(f, "No weights"),
            WeightingMode::Spline { knots } => write!(f, "Spline ({knots} knots)"),
            WeightingMode::ModelFunction => write!(f, "Model function"),
        }
    }
}

impl FromStr for WeightingMode {
    type Err = FitError;

    /// Accepts `none`, `model-function` and `spline[N]` (also the labels
    /// produced by `Display`). A spline suffix that is not a positive integer
    /// falls back to `DEFAULT_SPLINE_KNOTS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_lowercase();
        match text.as_str() {
            "" | "none" | "no weights" | "no-weights" => return Ok(WeightingMode::None),
            "model function" | "model-function" | "modelfunction" | "model" => {
                return Ok(WeightingMode::ModelFunction);
            }
            _ => {}
        }

        let Some(suffix) = text.strip_prefix("spline") else {
            return Err(FitError::InvalidWeightingConfig(format!(
                "unknown weighting mode '{s}' (expected none, splineN or model-function)"
            )));
        };

        let suffix = suffix.trim().trim_start_matches('-');
        // "Spline (7 knots)"
        let suffix = suffix
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix("knots)"))
            .map(str::trim)
            .unwrap_or(suffix);

        let knots = match suffix.parse::<usize>() {
            Ok(k) if k > 0 => k,
            _ => {
                if !suffix.is_empty() {
                    log::warn!(
                        "Cannot parse spline knot count '{suffix}', using {DEFAULT_SPLINE_KNOTS} knots."
                    );
                }
                DEFAULT_SPLINE_KNOTS
            }
        };
        Ok(WeightingMode::Spline { knots })
    }
}

/// A named background count rate (kHz).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
    pub name: String,
    pub rate: f64,
}

/// The backgrounds available to all pages. Pages refer to entries by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTable {
    entries: Vec<Background>,
}

impl BackgroundTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a background and return its index.
    pub fn push(&mut self, name: impl Into<String>, rate: f64) -> usize {
        self.entries.push(Background {
            name: name.into(),
            rate,
        });
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Background> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a page holds an auto- or a cross-correlation curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[default]
    Autocorrelation,
    CrossCorrelation,
}

impl DataKind {
    pub fn display_name(self) -> &'static str {
        match self {
            DataKind::Autocorrelation => "Autocorrelation",
            DataKind::CrossCorrelation => "Cross-correlation",
        }
    }
}

/// Output of a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Full parameter vector (fixed values included), validated by the model.
    pub values: Vec<f64>,
    /// Reduced chi-squared over the fitted channels.
    pub chi_squared: f64,
    pub iterations: usize,
    /// `false` when the optimizer stopped at its iteration cap.
    pub converged: bool,
}

/// Least-squares backend used for a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizerKind {
    /// Levenberg–Marquardt on the residual vector.
    #[default]
    #[value(name = "lm")]
    LevenbergMarquardt,
    /// L-BFGS on the sum of squared residuals.
    #[value(name = "lbfgs")]
    Lbfgs,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub model: ModelKind,
    /// Initial values; `None` means the model defaults.
    pub values: Option<Vec<f64>>,
    /// Fit flags; `None` means the model defaults.
    pub fit_mask: Option<Vec<bool>>,
    pub crop: Option<CropInterval>,
    pub weighting: String,
    pub window_halfwidth: usize,
    pub background: Option<Background>,
    pub title: Option<String>,
    pub optimizer: OptimizerKind,
    pub max_iterations: usize,
    pub export_curve: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_rejects_non_increasing_x() {
        let err = Series::new(vec![1.0, 1.0], vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, FitError::InvalidSeries(_)));
        assert!(Series::new(vec![1.0], vec![]).is_err());
    }

    #[test]
    fn parameter_set_requires_parallel_arrays() {
        let err = ParameterSet::new(vec!["n".into()], vec![1.0, 2.0], vec![true]).unwrap_err();
        assert_eq!(
            err,
            FitError::ParameterMismatch {
                names: 1,
                values: 2,
                mask: 1
            }
        );
    }

    #[test]
    fn free_names_follow_mask() {
        let p = ParameterSet::new(
            vec!["n".into(), "tau".into(), "SP".into()],
            vec![1.0, 2.0, 5.0],
            vec![true, false, true],
        )
        .unwrap();
        assert_eq!(p.free_count(), 2);
        assert_eq!(p.free_names(), vec!["n", "SP"]);
    }

    #[test]
    fn weighting_mode_parsing() {
        assert_eq!("none".parse::<WeightingMode>().unwrap(), WeightingMode::None);
        assert_eq!(
            "model-function".parse::<WeightingMode>().unwrap(),
            WeightingMode::ModelFunction
        );
        assert_eq!(
            "spline7".parse::<WeightingMode>().unwrap(),
            WeightingMode::Spline { knots: 7 }
        );
        assert_eq!(
            "Spline (9 knots)".parse::<WeightingMode>().unwrap(),
            WeightingMode::Spline { knots: 9 }
        );
        assert_eq!(
            "spline7x".parse::<WeightingMode>().unwrap(),
            WeightingMode::Spline { knots: 5 }
        );
        assert_eq!(
            "spline0".parse::<WeightingMode>().unwrap(),
            WeightingMode::Spline { knots: 5 }
        );
        assert!(matches!(
            "cubic".parse::<WeightingMode>(),
            Err(FitError::InvalidWeightingConfig(_))
        ));
    }

    #[test]
    fn weighting_mode_display_round_trips() {
        let mode = WeightingMode::Spline { knots: 12 };
        assert_eq!(mode.to_string().parse::<WeightingMode>().unwrap(), mode);
    }
}
