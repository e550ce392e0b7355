//! Background correction of correlation amplitudes.
//!
//! Uncorrelated background photons lower the measured correlation amplitude.
//! With `S` the average signal count rate and `B` the background rate, the
//! amplitude is restored by the factor
//!
//! ```text
//! (S / (S - B))²
//! ```
//!
//! (Thompson, "Fluorescence Correlation Spectroscopy", Topics in Fluorescence
//! Spectroscopy 1, 2002).

use crate::domain::Series;
use crate::error::FitError;

/// Multiplicative correction factor for correlation values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundCorrection {
    pub factor: f64,
}

impl Default for BackgroundCorrection {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl BackgroundCorrection {
    /// Factor for signal average `signal` and background rate `background` (both kHz).
    pub fn from_rates(signal: f64, background: f64) -> Result<Self, FitError> {
        let degenerate = FitError::DegenerateBackground { signal, background };
        if signal == background {
            return Err(degenerate);
        }
        let factor = (signal / (signal - background)).powi(2);
        if !factor.is_finite() {
            return Err(degenerate);
        }
        Ok(Self { factor })
    }

    /// Factor for an optional background selection. No background (or no known
    /// signal average) means no correction.
    pub fn resolve(background_rate: Option<f64>, signal_average: Option<f64>) -> Result<Self, FitError> {
        match (background_rate, signal_average) {
            (Some(b), Some(s)) => Self::from_rates(s, b),
            _ => Ok(Self::default()),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 1.0
    }
}

/// Background-corrected copy of `series`. The input is never modified.
pub fn correct(
    series: &Series,
    background_rate: Option<f64>,
    signal_average: Option<f64>,
) -> Result<Series, FitError> {
    let correction = BackgroundCorrection::resolve(background_rate, signal_average)?;
    if correction.is_identity() {
        return Ok(series.clone());
    }
    Ok(series.scale_y(correction.factor))
}

/// Average count rate of an intensity trace.
pub fn trace_average(trace: &Series) -> Option<f64> {
    if trace.is_empty() {
        return None;
    }
    Some(trace.y().iter().sum::<f64>() / trace.len() as f64)
}

/// Average count rate over several traces (cross-correlation pages carry one
/// trace per channel).
pub fn traces_average(traces: &[Series]) -> Option<f64> {
    let averages: Vec<f64> = traces.iter().filter_map(trace_average).collect();
    if averages.is_empty() {
        return None;
    }
    Some(averages.iter().sum::<f64>() / averages.len() as f64)
}
