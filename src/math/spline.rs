//! Cubic regression spline.
//!
//! Used to estimate the noise of a measured curve without reference to any
//! model: the curve is smoothed by a least-squares cubic spline and the
//! residuals against that spline are treated as noise.
//!
//! The spline uses the truncated power basis
//!
//! ```text
//! 1, u, u², u³, (u - k_1)³₊, ..., (u - k_K)³₊
//! ```
//!
//! where `u` is the abscissa mapped onto `[0, 1]`. Correlation curves are
//! sampled on a quasi-logarithmic lag-time grid, so `u` is taken in `ln(x)`
//! whenever all `x` are positive. Interior knots are equally spaced in `u`.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

/// Number of polynomial basis columns (cubic).
const POLY_TERMS: usize = 4;

/// A fitted regression spline.
#[derive(Debug, Clone)]
pub struct RegressionSpline {
    knots: Vec<f64>,
    coeffs: Vec<f64>,
    log_x: bool,
    lo: f64,
    span: f64,
}

impl RegressionSpline {
    /// Least-squares fit with `interior_knots` knots.
    ///
    /// The knot count is reduced when there are too few points to determine
    /// all coefficients. Returns `None` for fewer than four points or if the
    /// system cannot be solved.
    pub fn fit(x: &[f64], y: &[f64], interior_knots: usize) -> Option<Self> {
        let n = x.len();
        if n < POLY_TERMS || y.len() != n {
            return None;
        }
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return None;
        }

        let log_x = x.iter().all(|&v| v > 0.0);
        let t: Vec<f64> = if log_x { x.iter().map(|v| v.ln()).collect() } else { x.to_vec() };
        let lo = t[0];
        let hi = t[n - 1];
        let span = hi - lo;
        if !(span > 0.0) {
            return None;
        }

        let k = interior_knots.min(n - POLY_TERMS);
        let knots: Vec<f64> = (1..=k).map(|j| j as f64 / (k as f64 + 1.0)).collect();
        let cols = POLY_TERMS + k;

        let mut design = DMatrix::<f64>::zeros(n, cols);
        let mut row = vec![0.0; cols];
        for (i, &ti) in t.iter().enumerate() {
            fill_basis_row((ti - lo) / span, &knots, &mut row);
            for (j, v) in row.iter().enumerate() {
                design[(i, j)] = *v;
            }
        }
        let rhs = DVector::from_column_slice(y);

        let coeffs = solve_least_squares(&design, &rhs)?;
        Some(Self {
            knots,
            coeffs: coeffs.iter().copied().collect(),
            log_x,
            lo,
            span,
        })
    }

    pub fn knot_count(&self) -> usize {
        self.knots.len()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let t = if self.log_x { x.ln() } else { x };
        let mut row = vec![0.0; self.coeffs.len()];
        fill_basis_row((t - self.lo) / self.span, &self.knots, &mut row);
        row.iter().zip(&self.coeffs).map(|(b, c)| b * c).sum()
    }
}

fn fill_basis_row(u: f64, knots: &[f64], out: &mut [f64]) {
    out[0] = 1.0;
    out[1] = u;
    out[2] = u * u;
    out[3] = u * u * u;
    for (j, &k) in knots.iter().enumerate() {
        let d = (u - k).max(0.0);
        out[POLY_TERMS + j] = d * d * d;
    }
}
