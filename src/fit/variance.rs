//! Local variance estimates for weighted fits.
//!
//! A weighted fit needs the variance of every data point. It is estimated
//! from the `2n+1` channels around the point (fewer at the edges of the
//! series): either directly from a residual series, or after removing the
//! smooth part of the curve with a regression spline or the model itself.

use crate::domain::{CropInterval, Series};
use crate::error::FitError;
use crate::math::RegressionSpline;
use crate::models::{ModelKind, predict_all};

/// Sample variance of `y` over the channels `[index-n, index+n]`, clipped to
/// the bounds of the series.
pub fn variance(series: &Series, index: usize, n: usize) -> Result<f64, FitError> {
    window_variance(series.y(), index, n)
}

/// Slice version of [`variance`].
pub fn window_variance(values: &[f64], index: usize, n: usize) -> Result<f64, FitError> {
    if n == 0 {
        return Err(FitError::InvalidWeightingConfig(
            "variance window half-width must be >= 1".into(),
        ));
    }
    if index >= values.len() {
        return Err(FitError::InvalidWeightingConfig(format!(
            "variance window centre {index} outside {} channels",
            values.len()
        )));
    }
    let start = index.saturating_sub(n);
    let end = index.saturating_add(n).saturating_add(1).min(values.len());
    let v = sample_variance(&values[start..end]);
    if !v.is_finite() {
        return Err(FitError::InvalidSeries(format!(
            "non-finite value in the variance window around channel {index}"
        )));
    }
    Ok(v)
}

/// Variance of each channel of `interval`, computed on the full residual
/// series so that windows can reach past the interval edges.
pub fn residual_variances(residuals: &[f64], interval: CropInterval, n: usize) -> Result<Vec<f64>, FitError> {
    (interval.start..interval.end)
        .map(|i| window_variance(residuals, i, n))
        .collect()
}

/// Residuals against the model evaluated at `values`.
pub fn model_residual_variances(
    full: &Series,
    model: ModelKind,
    values: &[f64],
    interval: CropInterval,
    n: usize,
) -> Result<Vec<f64>, FitError> {
    let fitted = predict_all(model, full.x(), &model.check_parms(values));
    let residuals: Vec<f64> = full.y().iter().zip(&fitted).map(|(y, f)| y - f).collect();
    if residuals.iter().any(|r| !r.is_finite()) {
        return Err(FitError::FitConvergence(
            "model is not finite at the initial parameters".into(),
        ));
    }
    residual_variances(&residuals, interval, n)
}

/// Residuals against a cubic regression spline with `knots` interior knots.
pub fn spline_residual_variances(
    full: &Series,
    knots: usize,
    interval: CropInterval,
    n: usize,
) -> Result<Vec<f64>, FitError> {
    let spline = RegressionSpline::fit(full.x(), full.y(), knots).ok_or_else(|| {
        FitError::InvalidWeightingConfig(format!(
            "cannot fit a {knots}-knot spline to {} channels",
            full.len()
        ))
    })?;
    log::debug!("Spline weighting with {} interior knots.", spline.knot_count());
    let residuals: Vec<f64> = full.pairs().map(|(x, y)| y - spline.evaluate(x)).collect();
    residual_variances(&residuals, interval, n)
}

/// Replace zero variances so they can be used as weights.
///
/// Zeros become the smallest positive variance present, or `1.0` if there is none.
pub fn floor_variances(variances: &mut [f64]) {
    let floor = variances
        .iter()
        .copied()
        .filter(|v| *v > 0.0 && v.is_finite())
        .fold(f64::INFINITY, f64::min);
    let floor = if floor.is_finite() { floor } else { 1.0 };
    for v in variances.iter_mut() {
        if !(*v > 0.0 && v.is_finite()) {
            *v = floor;
        }
    }
}

/// Unbiased sample variance; `0` for fewer than two values, NaN if any value
/// is not finite.
///
/// Values are shifted by the first element before summing, which keeps the
/// result exact (zero) for constant windows.
fn sample_variance(values: &[f64]) -> f64 {
    let k = values.len();
    if k < 2 {
        return 0.0;
    }
    let shift = values[0];
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        let d = v - shift;
        sum += d;
        sum_sq += d * d;
    }
    let kf = k as f64;
    let v = (sum_sq - sum * sum / kf) / (kf - 1.0);
    // Rounding can push a tiny variance below zero.
    if v < 0.0 { 0.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Series {
        let x: Vec<f64> = (1..=len).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| v * 2.0).collect();
        Series::new(x, y).unwrap()
    }

    #[test]
    fn constant_series_has_zero_variance() {
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let series = Series::new(x, vec![0.1; 12]).unwrap();
        for i in 0..12 {
            for n in 1..15 {
                assert_eq!(variance(&series, i, n).unwrap(), 0.0);
            }
        }
    }

    #[test]
    fn interior_window_is_symmetric() {
        // Window [1, 3] of y = 2x: values 4, 6, 8 -> variance 4.
        let v = variance(&ramp(10), 2, 1).unwrap();
        assert!((v - 4.0).abs() < 1e-12);
    }

    #[test]
    fn edge_windows_are_clipped() {
        // Index 0, n = 2: values 2, 4, 6 -> variance 4.
        let v = variance(&ramp(10), 0, 2).unwrap();
        assert!((v - 4.0).abs() < 1e-12);
        // Last index, n = 1: values 18, 20 -> variance 2.
        let v = variance(&ramp(10), 9, 1).unwrap();
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_half_width_is_rejected() {
        assert!(matches!(
            variance(&ramp(5), 2, 0),
            Err(FitError::InvalidWeightingConfig(_))
        ));
        assert!(variance(&ramp(5), 5, 1).is_err());
    }

    #[test]
    fn huge_half_width_covers_the_whole_series() {
        let series = Series::from_pairs(&[(1.0, 1.0), (2.0, 2.0), (3.0, 4.0)]).unwrap();
        let all = variance(&series, 1, usize::MAX).unwrap();
        assert!((all - 7.0 / 3.0).abs() < 1e-12);
        assert_eq!(variance(&series, 1, 1000).unwrap(), all);
        assert_eq!(variance(&series, 2, usize::MAX).unwrap(), all);
    }

    #[test]
    fn nan_in_the_window_is_reported() {
        let series = Series::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![1.0, f64::NAN, 1.5, 2.0, 2.5, 3.0],
        )
        .unwrap();
        assert!(matches!(variance(&series, 2, 1), Err(FitError::InvalidSeries(_))));
        assert!(variance(&series, 4, 1).unwrap() > 0.0);
    }

    #[test]
    fn residual_variances_cover_the_interval() {
        let residuals = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let v = residual_variances(&residuals, CropInterval::new(2, 4), 1).unwrap();
        assert_eq!(v.len(), 2);
        for value in v {
            assert!(value > 0.0);
        }
    }

    #[test]
    fn model_residuals_vanish_for_exact_data() {
        let model = ModelKind::Diffusion2d;
        let values = model.default_values();
        let x: Vec<f64> = (0..40).map(|i| 0.001 * 1.3f64.powi(i)).collect();
        let y = predict_all(model, &x, &values);
        let full = Series::new(x, y).unwrap();
        let v = model_residual_variances(&full, model, &values, CropInterval::full(40), 3).unwrap();
        assert!(v.iter().all(|v| *v < 1e-24));
    }

    #[test]
    fn spline_residuals_are_small_for_smooth_data() {
        let model = ModelKind::Diffusion3d;
        let x: Vec<f64> = (0..60).map(|i| 0.001 * 1.2f64.powi(i)).collect();
        let y = predict_all(model, &x, &model.default_values());
        let full = Series::new(x, y).unwrap();
        let v = spline_residual_variances(&full, 5, CropInterval::new(10, 50), 3).unwrap();
        assert_eq!(v.len(), 40);
        assert!(v.iter().all(|v| *v < 1e-4));
    }

    #[test]
    fn floor_replaces_zeros() {
        let mut v = vec![0.0, 2.0, 0.5, 0.0];
        floor_variances(&mut v);
        assert_eq!(v, vec![0.5, 2.0, 0.5, 0.5]);

        let mut zeros = vec![0.0, 0.0];
        floor_variances(&mut zeros);
        assert_eq!(zeros, vec![1.0, 1.0]);
    }
}
