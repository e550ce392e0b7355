//! Error types.
//!
//! `FitError` is the typed failure of the fitting core. `AppError` is what the
//! binary reports: a message plus a process exit code.

use thiserror::Error;

/// Failures of the curve preparation and fitting pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Signal average equals the background rate, so `(S/(S-B))^2` is undefined.
    #[error(
        "Background correction undefined: signal average {signal} kHz equals background rate {background} kHz."
    )]
    DegenerateBackground { signal: f64, background: f64 },

    #[error("Invalid weighting configuration: {0}")]
    InvalidWeightingConfig(String),

    /// The optimizer could not produce a finite solution.
    #[error("Fit did not converge: {0}")]
    FitConvergence(String),

    #[error("Invalid series: {0}")]
    InvalidSeries(String),

    #[error("Parameter arrays differ in length: {names} names, {values} values, {mask} mask flags.")]
    ParameterMismatch {
        names: usize,
        values: usize,
        mask: usize,
    },

    #[error("A fit is already running on this page.")]
    FitInProgress,

    /// A fit outcome was handed to a page that has no fit running.
    #[error("No fit is running on this page.")]
    FitNotRunning,

    #[error("No experimental data loaded.")]
    NoData,
}

impl FitError {
    /// Exit code used when this error terminates the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::InvalidWeightingConfig(_)
            | FitError::ParameterMismatch { .. }
            | FitError::InvalidSeries(_) => 2,
            FitError::DegenerateBackground { .. } | FitError::NoData => 3,
            FitError::FitConvergence(_) | FitError::FitInProgress | FitError::FitNotRunning => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_map_to_exit_codes() {
        let err: AppError = FitError::InvalidWeightingConfig("n = 0".into()).into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("n = 0"));

        let err: AppError = FitError::FitConvergence("nan".into()).into();
        assert_eq!(err.exit_code(), 4);
    }
}
