//! Synthetic FCS measurements.
//!
//! Generates a correlation curve from a model on a log-spaced lag-time grid,
//! with lag-dependent Gaussian noise, and optionally the matching intensity
//! trace. A background rate attenuates the curve the way uncorrelated
//! background photons do, so that background correction restores it.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::background::BackgroundCorrection;
use crate::domain::Series;
use crate::error::AppError;
use crate::math::log_space;
use crate::models::{ModelKind, predict};

/// Inputs for a synthetic measurement.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub model: ModelKind,
    pub values: Vec<f64>,
    pub tau_min: f64,
    pub tau_max: f64,
    pub channels: usize,
    /// Noise level relative to the curve amplitude at the shortest lag time.
    pub noise: f64,
    pub seed: u64,
    /// Mean count rate of the trace (kHz), background included.
    pub count_rate: f64,
    pub background_rate: Option<f64>,
    pub trace_points: usize,
    /// Measurement duration (s) covered by the trace.
    pub duration: f64,
}

impl SimulationConfig {
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            values: model.default_values(),
            tau_min: 1e-3,
            tau_max: 1e3,
            channels: 150,
            noise: 0.01,
            seed: 42,
            count_rate: 100.0,
            background_rate: None,
            trace_points: 200,
            duration: 30.0,
        }
    }
}

/// A simulated correlation curve and intensity trace.
#[derive(Debug, Clone)]
pub struct SimulatedData {
    pub correlation: Series,
    pub trace: Series,
}

pub fn simulate(config: &SimulationConfig) -> Result<SimulatedData, AppError> {
    if config.values.len() != config.model.param_count() {
        return Err(AppError::new(
            2,
            format!(
                "Model {} takes {} parameters, got {}.",
                config.model.id(),
                config.model.param_count(),
                config.values.len()
            ),
        ));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::new(2, "Noise level must be finite and >= 0."));
    }
    if !(config.count_rate.is_finite() && config.count_rate > 0.0) {
        return Err(AppError::new(2, "Count rate must be finite and > 0."));
    }
    if config.trace_points < 2 || !(config.duration > 0.0) {
        return Err(AppError::new(2, "Trace needs >= 2 points and a positive duration."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    // The measured amplitude is lowered by 1/factor when background is present.
    let attenuation = match config.background_rate {
        Some(b) => {
            let correction = BackgroundCorrection::from_rates(config.count_rate, b)?;
            1.0 / correction.factor
        }
        None => 1.0,
    };

    let taus = log_space(config.tau_min, config.tau_max, config.channels)?;
    let params = config.model.check_parms(&config.values);
    let amplitude = predict(config.model, taus[0], &params).abs().max(1e-12);

    let mut g = Vec::with_capacity(taus.len());
    for &tau in &taus {
        // Short lag times are averaged over fewer photon pairs.
        let sigma = config.noise * amplitude * (taus[0] / tau).powf(0.25);
        let clean = predict(config.model, tau, &params) * attenuation;
        g.push(clean + sigma * normal.sample(&mut rng));
    }
    let correlation = Series::new(taus, g)?;

    let dt = config.duration / (config.trace_points as f64 - 1.0);
    let shot = config.count_rate.sqrt();
    let mut times = Vec::with_capacity(config.trace_points);
    let mut rates = Vec::with_capacity(config.trace_points);
    for i in 0..config.trace_points {
        times.push(i as f64 * dt);
        rates.push((config.count_rate + shot * normal.sample(&mut rng)).max(0.0));
    }
    let trace = Series::new(times, rates)?;

    log::debug!(
        "Simulated model {} on {} channels (seed {}).",
        config.model.id(),
        correlation.len(),
        config.seed
    );

    Ok(SimulatedData { correlation, trace })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_without_noise_follows_the_model() {
        let mut config = SimulationConfig::new(ModelKind::Diffusion3d);
        config.noise = 0.0;
        config.channels = 20;
        let data = simulate(&config).unwrap();
        assert_eq!(data.correlation.len(), 20);
        for (tau, g) in data.correlation.pairs() {
            assert!((g - predict(ModelKind::Diffusion3d, tau, &config.values)).abs() < 1e-12);
        }
    }

    #[test]
    fn simulation_is_deterministic_for_a_seed() {
        let config = SimulationConfig::new(ModelKind::Diffusion2d);
        let a = simulate(&config).unwrap();
        let b = simulate(&config).unwrap();
        assert_eq!(a.correlation, b.correlation);
        assert_eq!(a.trace, b.trace);
    }

    #[test]
    fn background_attenuates_the_curve() {
        let mut config = SimulationConfig::new(ModelKind::Diffusion2d);
        config.noise = 0.0;
        config.count_rate = 100.0;
        config.background_rate = Some(50.0);
        let data = simulate(&config).unwrap();
        let clean = predict(ModelKind::Diffusion2d, data.correlation.x()[0], &config.values);
        assert!((data.correlation.y()[0] * 4.0 - clean).abs() < 1e-12);
    }

    #[test]
    fn parameter_count_is_checked() {
        let mut config = SimulationConfig::new(ModelKind::Diffusion3d);
        config.values.pop();
        assert_eq!(simulate(&config).unwrap_err().exit_code(), 2);
    }
}
