//! A fitting page: one measured curve, one model and its parameters.
//!
//! Fit lifecycle:
//!
//! ```text
//! Idle -> Configuring -> Running -> Succeeded
//!                                 \-> (failure) Idle, prior parameters kept
//! ```
//!
//! `begin_fit` snapshots everything the fit needs into a `FitJob`, which can be
//! run on another thread; `finish_fit` applies its outcome. While a job is out
//! the page is `Running` and further fits are rejected.

use crate::data::background::{BackgroundCorrection, correct, trace_average, traces_average};
use crate::data::crop::crop;
use crate::domain::{
    BackgroundTable, CropInterval, DataKind, FitResult, ParameterSet, Series, WeightingMode,
};
use crate::error::FitError;
use crate::fit::config::{FitRequest, build_with_mode};
use crate::fit::optimizer::{Optimizer, Problem, chi_squared};
use crate::models::{ModelKind, predict_all};

/// Where a page is in its fit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitState {
    #[default]
    Idle,
    Configuring,
    Running,
    Succeeded,
}

/// Everything needed to run one fit, detached from the page.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub request: FitRequest,
    /// Background-corrected full series.
    pub data: Series,
}

impl FitJob {
    pub fn run(&self, optimizer: &dyn Optimizer) -> Result<FitResult, FitError> {
        self.request.solve(&self.data, optimizer)
    }
}

/// Curves derived from the current page state.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveView {
    /// Cropped, background-corrected measurement.
    pub experimental: Option<Series>,
    /// Model evaluated on the cropped lag times.
    pub model: Series,
    /// `experimental - model`.
    pub residuals: Option<Series>,
    pub interval: Option<CropInterval>,
    pub correction: BackgroundCorrection,
}

#[derive(Debug, Clone)]
pub struct Page {
    /// Page number.
    pub counter: usize,
    pub title: String,
    pub model: ModelKind,
    parameters: ParameterSet,
    data_full: Option<Series>,
    /// Intensity traces: one for autocorrelation, two for cross-correlation.
    traces: Vec<Series>,
    pub data_kind: DataKind,
    /// Index into the shared `BackgroundTable`.
    pub background: Option<usize>,
    pub crop: Option<CropInterval>,
    pub weighting: WeightingMode,
    pub window_halfwidth: usize,
    /// Lag times used when no data is loaded.
    tau: Vec<f64>,
    chi2: Option<f64>,
    state: FitState,
}

impl Page {
    /// New page with the model's default parameters.
    pub fn new(counter: usize, model: ModelKind, tau: Vec<f64>) -> Self {
        Self {
            counter,
            title: String::new(),
            model,
            parameters: ParameterSet::defaults(model),
            data_full: None,
            traces: Vec::new(),
            data_kind: DataKind::Autocorrelation,
            background: None,
            crop: None,
            weighting: WeightingMode::None,
            window_halfwidth: 3,
            tau,
            chi2: None,
            state: FitState::Idle,
        }
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn data(&self) -> Option<&Series> {
        self.data_full.as_ref()
    }

    pub fn traces(&self) -> &[Series] {
        &self.traces
    }

    pub fn chi2(&self) -> Option<f64> {
        self.chi2
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    /// Load a measured correlation curve. Invalidates chi².
    pub fn set_data(&mut self, data: Series) {
        self.tau = data.x().to_vec();
        self.data_full = Some(data);
        self.chi2 = None;
    }

    pub fn set_traces(&mut self, traces: Vec<Series>) {
        self.data_kind = if traces.len() > 1 {
            DataKind::CrossCorrelation
        } else {
            DataKind::Autocorrelation
        };
        self.traces = traces;
    }

    /// Average signal count rate of the page's trace(s).
    pub fn signal_average(&self) -> Option<f64> {
        match self.traces.as_slice() {
            [] => None,
            [single] => trace_average(single),
            many => traces_average(many),
        }
    }

    /// Write new values and fit flags, validated by the model.
    pub fn apply_parameters(&mut self, values: Vec<f64>, fit_mask: Vec<bool>) -> Result<(), FitError> {
        if values.len() != self.model.param_count() {
            return Err(FitError::ParameterMismatch {
                names: self.model.param_count(),
                values: values.len(),
                mask: fit_mask.len(),
            });
        }
        let checked = self.model.check_parms(&values);
        self.parameters.set_fit_mask(fit_mask)?;
        self.parameters.set_values(checked)?;
        self.chi2 = None;
        Ok(())
    }

    fn background_rate(&self, backgrounds: &BackgroundTable) -> Option<f64> {
        self.background.and_then(|i| backgrounds.get(i)).map(|b| b.rate)
    }

    /// Background correction currently in effect for this page.
    pub fn correction(&self, backgrounds: &BackgroundTable) -> Result<BackgroundCorrection, FitError> {
        BackgroundCorrection::resolve(self.background_rate(backgrounds), self.signal_average())
    }

    /// Background-corrected full series.
    pub fn corrected_data(&self, backgrounds: &BackgroundTable) -> Result<Series, FitError> {
        let data = self.data_full.as_ref().ok_or(FitError::NoData)?;
        correct(data, self.background_rate(backgrounds), self.signal_average())
    }

    /// Configure a fit and hand out the job. The page is `Running` afterwards.
    pub fn begin_fit(&mut self, backgrounds: &BackgroundTable) -> Result<FitJob, FitError> {
        if self.state == FitState::Running {
            return Err(FitError::FitInProgress);
        }
        let previous = self.state;
        self.state = FitState::Configuring;

        let configured = self.corrected_data(backgrounds).and_then(|data| {
            let request = build_with_mode(
                self.model,
                &self.parameters,
                self.crop,
                self.weighting,
                self.window_halfwidth,
            )?;
            Ok(FitJob { request, data })
        });

        match configured {
            Ok(job) => {
                self.state = FitState::Running;
                Ok(job)
            }
            Err(e) => {
                self.state = if previous == FitState::Succeeded {
                    FitState::Succeeded
                } else {
                    FitState::Idle
                };
                Err(e)
            }
        }
    }

    /// Apply the outcome of a job started with `begin_fit`.
    ///
    /// On failure, including a result that does not fit the model, the prior
    /// parameters stay authoritative and the error is handed back to the
    /// caller for reporting. Outcomes arriving while no fit is running are
    /// rejected and leave the page untouched.
    pub fn finish_fit(&mut self, outcome: Result<FitResult, FitError>) -> Result<FitResult, FitError> {
        if self.state != FitState::Running {
            return Err(FitError::FitNotRunning);
        }
        let applied = outcome.and_then(|result| {
            self.parameters.set_values(result.values.clone())?;
            Ok(result)
        });
        match applied {
            Ok(result) => {
                self.chi2 = Some(result.chi_squared);
                self.state = FitState::Succeeded;
                log::info!(
                    "Page {}: fit finished after {} iterations, chi² = {:.6e}.",
                    self.counter,
                    result.iterations,
                    result.chi_squared
                );
                Ok(result)
            }
            Err(e) => {
                self.state = FitState::Idle;
                log::warn!("Page {}: fit failed: {e}", self.counter);
                Err(e)
            }
        }
    }

    /// Configure, run and apply a fit in one go.
    pub fn fit(&mut self, backgrounds: &BackgroundTable, optimizer: &dyn Optimizer) -> Result<FitResult, FitError> {
        let job = self.begin_fit(backgrounds)?;
        let outcome = job.run(optimizer);
        self.finish_fit(outcome)
    }

    /// Recompute the model curve, the cropped and corrected measurement and
    /// the residuals. Fills chi² if it has not been computed yet.
    pub fn refresh(&mut self, backgrounds: &BackgroundTable) -> Result<CurveView, FitError> {
        let correction = self.correction(backgrounds)?;
        let values = self.model.check_parms(self.parameters.values());
        self.parameters.set_values(values.clone())?;

        let Some(full) = self.data_full.as_ref() else {
            let model_curve = Series::new(self.tau.clone(), predict_all(self.model, &self.tau, &values))?;
            return Ok(CurveView {
                experimental: None,
                model: model_curve,
                residuals: None,
                interval: None,
                correction,
            });
        };

        let cropped = crop(full, self.crop);
        self.crop = Some(cropped.interval);
        let experimental = cropped.series.scale_y(correction.factor);
        let fitted = predict_all(self.model, experimental.x(), &values);
        let residuals: Vec<f64> = experimental.y().iter().zip(&fitted).map(|(e, f)| e - f).collect();
        let model_curve = experimental.with_y(fitted);
        let residual_curve = experimental.with_y(residuals);

        if self.chi2.is_none() {
            self.chi2 = Some(self.current_chi2(full, correction, &values)?);
        }

        Ok(CurveView {
            experimental: Some(experimental),
            model: model_curve,
            residuals: Some(residual_curve),
            interval: Some(cropped.interval),
            correction,
        })
    }

    fn current_chi2(&self, full: &Series, correction: BackgroundCorrection, values: &[f64]) -> Result<f64, FitError> {
        let request = build_with_mode(
            self.model,
            &self.parameters,
            self.crop,
            self.weighting,
            self.window_halfwidth,
        )?;
        let corrected = full.scale_y(correction.factor);
        let interval = request.resolved_interval(corrected.len());
        let sigma = request.sigmas(&corrected, interval)?;
        let problem = Problem {
            model: self.model,
            initial: values,
            fit_mask: self.parameters.fit_mask(),
            x: &corrected.x()[interval.start..interval.end],
            y: &corrected.y()[interval.start..interval.end],
            sigma: sigma.as_deref(),
        };
        Ok(chi_squared(&problem, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::optimizer::{LevenbergMarquardt, Solution};

    fn lag_times() -> Vec<f64> {
        (0..90).map(|i| 1e-3 * 1.2f64.powi(i)).collect()
    }

    fn page_with_data(truth: &[f64]) -> Page {
        let model = ModelKind::Diffusion3d;
        let tau = lag_times();
        let mut page = Page::new(1, model, tau.clone());
        let y = predict_all(model, &tau, truth);
        page.set_data(Series::new(tau, y).unwrap());
        page
    }

    #[test]
    fn successful_fit_updates_parameters_and_chi2() {
        let mut page = page_with_data(&[7.0, 0.3, 5.0, 0.0]);
        let result = page.fit(&BackgroundTable::new(), &LevenbergMarquardt::default()).unwrap();
        assert_eq!(page.state(), FitState::Succeeded);
        assert!((page.parameters().values()[0] - 7.0).abs() < 1e-6);
        assert_eq!(page.chi2(), Some(result.chi_squared));
    }

    #[test]
    fn second_fit_while_running_is_rejected() {
        let mut page = page_with_data(&[7.0, 0.3, 5.0, 0.0]);
        let backgrounds = BackgroundTable::new();
        let job = page.begin_fit(&backgrounds).unwrap();
        assert_eq!(page.state(), FitState::Running);
        assert_eq!(page.begin_fit(&backgrounds).unwrap_err(), FitError::FitInProgress);

        let outcome = job.run(&LevenbergMarquardt::default());
        page.finish_fit(outcome).unwrap();
        assert!(page.begin_fit(&backgrounds).is_ok());
    }

    #[test]
    fn failed_fit_keeps_prior_parameters() {
        let mut page = page_with_data(&[7.0, 0.3, 5.0, 0.0]);
        let before = page.parameters().clone();
        let _job = page.begin_fit(&BackgroundTable::new()).unwrap();
        let err = page
            .finish_fit(Err(FitError::FitConvergence("diverged".into())))
            .unwrap_err();
        assert!(matches!(err, FitError::FitConvergence(_)));
        assert_eq!(page.parameters(), &before);
        assert_eq!(page.state(), FitState::Idle);
        assert_eq!(page.chi2(), None);
    }

    /// Solver that hands back a parameter vector of the wrong length.
    struct ShortResult;

    impl Optimizer for ShortResult {
        fn optimize(&self, _problem: &Problem<'_>) -> Result<Solution, FitError> {
            Ok(Solution {
                values: vec![1.0],
                chi_squared: 0.0,
                iterations: 1,
                converged: true,
            })
        }
    }

    #[test]
    fn malformed_result_returns_page_to_idle() {
        let mut page = Page::new(6, ModelKind::Diffusion2d, lag_times());
        let tau = lag_times();
        let y = predict_all(ModelKind::Diffusion2d, &tau, &[4.0, 0.4, 0.0]);
        page.set_data(Series::new(tau, y).unwrap());
        let before = page.parameters().clone();
        let backgrounds = BackgroundTable::new();

        let err = page.fit(&backgrounds, &ShortResult).unwrap_err();
        assert!(matches!(err, FitError::ParameterMismatch { .. }));
        assert_eq!(page.state(), FitState::Idle);
        assert_eq!(page.parameters(), &before);
        assert!(page.begin_fit(&backgrounds).is_ok());
    }

    #[test]
    fn outcome_without_running_fit_is_rejected() {
        let mut page = page_with_data(&[7.0, 0.3, 5.0, 0.0]);
        let before = page.parameters().clone();
        let result = FitResult {
            values: vec![1.0, 1.0, 5.0, 0.0],
            chi_squared: 0.5,
            iterations: 3,
            converged: true,
        };
        assert_eq!(page.finish_fit(Ok(result)).unwrap_err(), FitError::FitNotRunning);
        assert_eq!(page.state(), FitState::Idle);
        assert_eq!(page.parameters(), &before);
        assert_eq!(page.chi2(), None);
    }

    #[test]
    fn degenerate_background_aborts_before_running() {
        let mut page = page_with_data(&[7.0, 0.3, 5.0, 0.0]);
        let trace = Series::from_pairs(&[(0.0, 50.0), (1.0, 50.0)]).unwrap();
        page.set_traces(vec![trace]);
        let mut backgrounds = BackgroundTable::new();
        page.background = Some(backgrounds.push("buffer", 50.0));

        let err = page.fit(&backgrounds, &LevenbergMarquardt::default()).unwrap_err();
        assert!(matches!(err, FitError::DegenerateBackground { .. }));
        assert_eq!(page.state(), FitState::Idle);
    }

    #[test]
    fn background_correction_is_applied_to_fit_data() {
        let model = ModelKind::Diffusion3d;
        let tau = lag_times();
        let mut page = Page::new(2, model, tau.clone());
        // Measured amplitude is a quarter of the true one for S = 100, B = 50.
        let y: Vec<f64> = predict_all(model, &tau, &[5.0, 0.5, 5.0, 0.0])
            .into_iter()
            .map(|g| g / 4.0)
            .collect();
        page.set_data(Series::new(tau, y).unwrap());
        page.set_traces(vec![Series::from_pairs(&[(0.0, 100.0), (1.0, 100.0)]).unwrap()]);
        let mut backgrounds = BackgroundTable::new();
        page.background = Some(backgrounds.push("buffer", 50.0));

        page.fit(&backgrounds, &LevenbergMarquardt::default()).unwrap();
        assert!((page.parameters().values()[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn refresh_without_data_evaluates_the_model() {
        let mut page = Page::new(3, ModelKind::Diffusion2d, lag_times());
        let view = page.refresh(&BackgroundTable::new()).unwrap();
        assert!(view.experimental.is_none());
        assert_eq!(view.model.len(), 90);
        assert_eq!(page.chi2(), None);
    }

    #[test]
    fn refresh_resolves_crop_and_fills_chi2() {
        let mut page = page_with_data(&[4.0, 0.4, 5.0, 0.0]);
        page.crop = Some(CropInterval::new(10, 10));
        let view = page.refresh(&BackgroundTable::new()).unwrap();
        assert_eq!(view.interval, Some(CropInterval::full(90)));
        assert_eq!(page.crop, Some(CropInterval::full(90)));
        let residuals = view.residuals.unwrap();
        assert!(residuals.y().iter().all(|r| r.abs() < 1e-15));
        assert!(page.chi2().unwrap() < 1e-24);
    }

    #[test]
    fn apply_parameters_runs_model_validation() {
        let mut page = Page::new(4, ModelKind::Diffusion2d, lag_times());
        page.apply_parameters(vec![-3.0, 0.2, 0.0], vec![true, false, false]).unwrap();
        assert_eq!(page.parameters().values(), &[3.0, 0.2, 0.0]);
        assert_eq!(page.parameters().fit_mask(), &[true, false, false]);
        assert!(page.apply_parameters(vec![1.0], vec![true]).is_err());
    }

    #[test]
    fn two_traces_mark_cross_correlation() {
        let mut page = Page::new(5, ModelKind::Diffusion2d, lag_times());
        let a = Series::from_pairs(&[(0.0, 10.0)]).unwrap();
        let b = Series::from_pairs(&[(0.0, 30.0)]).unwrap();
        page.set_traces(vec![a, b]);
        assert_eq!(page.data_kind, DataKind::CrossCorrelation);
        assert_eq!(page.signal_average(), Some(20.0));
    }
}
