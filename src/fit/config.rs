//! Fit configuration.
//!
//! `build` validates the user's choices and snapshots the parameters into a
//! `FitRequest`. The request owns copies of the values and fit flags: the
//! optimizer works on those, and the caller's `ParameterSet` only changes when
//! the result is explicitly applied.

use crate::data::crop::{CropValidity, validate};
use crate::domain::{CropInterval, FitResult, ParameterSet, Series, WeightingMode};
use crate::error::FitError;
use crate::fit::optimizer::{Optimizer, Problem};
use crate::fit::variance::{floor_variances, model_residual_variances, spline_residual_variances};
use crate::models::ModelKind;

/// Largest accepted variance window half-width.
pub const MAX_WINDOW_HALFWIDTH: usize = 100;

/// A validated, self-contained fit request.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRequest {
    pub model: ModelKind,
    pub values: Vec<f64>,
    pub fit_mask: Vec<bool>,
    /// Requested crop interval; resolved against the data in [`FitRequest::solve`].
    pub interval: Option<CropInterval>,
    pub weighting: WeightingMode,
    pub window_halfwidth: usize,
}

/// Validate the fit settings and build a request.
pub fn build(
    model: ModelKind,
    parameters: &ParameterSet,
    crop_interval: Option<CropInterval>,
    weighting_mode: &str,
    window_halfwidth: usize,
) -> Result<FitRequest, FitError> {
    let weighting: WeightingMode = weighting_mode.parse()?;
    build_with_mode(model, parameters, crop_interval, weighting, window_halfwidth)
}

/// [`build`] for an already parsed weighting mode.
pub fn build_with_mode(
    model: ModelKind,
    parameters: &ParameterSet,
    crop_interval: Option<CropInterval>,
    weighting: WeightingMode,
    window_halfwidth: usize,
) -> Result<FitRequest, FitError> {
    if !(1..=MAX_WINDOW_HALFWIDTH).contains(&window_halfwidth) {
        return Err(FitError::InvalidWeightingConfig(format!(
            "window half-width must be within 1..={MAX_WINDOW_HALFWIDTH}, got {window_halfwidth}"
        )));
    }
    if let WeightingMode::Spline { knots: 0 } = weighting {
        return Err(FitError::InvalidWeightingConfig("spline needs at least one knot".into()));
    }
    if parameters.len() != model.param_count() {
        return Err(FitError::ParameterMismatch {
            names: model.param_count(),
            values: parameters.len(),
            mask: parameters.fit_mask().len(),
        });
    }

    Ok(FitRequest {
        model,
        values: parameters.values().to_vec(),
        fit_mask: parameters.fit_mask().to_vec(),
        interval: crop_interval,
        weighting,
        window_halfwidth,
    })
}

impl FitRequest {
    /// Interval actually used on a series with `len` channels.
    pub fn resolved_interval(&self, len: usize) -> CropInterval {
        match validate(self.interval, len) {
            CropValidity::Valid(iv) => iv,
            CropValidity::Full | CropValidity::Invalid => CropInterval::full(len),
        }
    }

    /// Standard deviations for the channels of `interval`, `None` when unweighted.
    pub fn sigmas(&self, full: &Series, interval: CropInterval) -> Result<Option<Vec<f64>>, FitError> {
        let n = self.window_halfwidth;
        let mut variances = match self.weighting {
            WeightingMode::None => return Ok(None),
            WeightingMode::ModelFunction => {
                model_residual_variances(full, self.model, &self.values, interval, n)?
            }
            WeightingMode::Spline { knots } => spline_residual_variances(full, knots, interval, n)?,
        };
        floor_variances(&mut variances);
        Ok(Some(variances.into_iter().map(f64::sqrt).collect()))
    }

    /// Fit the background-corrected full series over the request's interval.
    ///
    /// Weights are estimated on the full series so that variance windows at
    /// the interval edges can use neighbouring channels.
    pub fn solve(&self, full: &Series, optimizer: &dyn Optimizer) -> Result<FitResult, FitError> {
        if full.is_empty() {
            return Err(FitError::NoData);
        }
        let interval = self.resolved_interval(full.len());
        let sigma = self.sigmas(full, interval)?;

        let x = &full.x()[interval.start..interval.end];
        let y = &full.y()[interval.start..interval.end];
        let problem = Problem {
            model: self.model,
            initial: &self.values,
            fit_mask: &self.fit_mask,
            x,
            y,
            sigma: sigma.as_deref(),
        };

        log::debug!(
            "Fitting model {} on channels {} ({}).",
            self.model.id(),
            interval,
            self.weighting
        );
        let solution = optimizer.optimize(&problem)?;
        Ok(FitResult {
            values: solution.values,
            chi_squared: solution.chi_squared,
            iterations: solution.iterations,
            converged: solution.converged,
        })
    }
}
