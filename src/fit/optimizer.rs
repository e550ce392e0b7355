//! Nonlinear least-squares optimization.
//!
//! The fit configurator only knows the `Optimizer` trait. This module holds
//! the default implementation, a Levenberg–Marquardt solver over the free
//! parameters (an `argmin` L-BFGS backend lives in `lbfgs`):
//!
//! - residuals are `(y_i - G(τ_i)) / σ_i` (σ = 1 for unweighted fits)
//! - the Jacobian is taken by forward differences
//! - each damped step solves the augmented system `[J; √λ·D] δ = [-r; 0]`
//!   with the SVD least-squares routine
//! - the model's `check_parms` is applied on every evaluation, so the
//!   optimizer can wander into unphysical values without producing NaNs

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;
use crate::math::solve_least_squares;
use crate::models::{ModelKind, predict};

/// `sqrt(f64::EPSILON)`, relative step for forward differences.
const DIFF_STEP: f64 = 1.49e-8;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;

/// Everything a solver needs for one fit.
#[derive(Debug, Clone, Copy)]
pub struct Problem<'a> {
    pub model: ModelKind,
    /// Full initial parameter vector (fixed values included).
    pub initial: &'a [f64],
    pub fit_mask: &'a [bool],
    pub x: &'a [f64],
    pub y: &'a [f64],
    /// Per-point standard deviations; `None` for an unweighted fit.
    pub sigma: Option<&'a [f64]>,
}

impl Problem<'_> {
    pub(crate) fn free_indices(&self) -> Vec<usize> {
        self.fit_mask
            .iter()
            .enumerate()
            .filter_map(|(i, fit)| fit.then_some(i))
            .collect()
    }

    /// Full, validated parameter vector from the free values.
    pub(crate) fn expand(&self, free_idx: &[usize], free: &[f64]) -> Vec<f64> {
        let mut full = self.initial.to_vec();
        for (&i, &v) in free_idx.iter().zip(free) {
            full[i] = v;
        }
        self.model.check_parms(&full)
    }

    pub(crate) fn residuals(&self, params: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y).enumerate().map(|(i, (&x, &y))| {
                let s = self.sigma.map_or(1.0, |s| s[i]);
                (y - predict(self.model, x, params)) / s
            }),
        )
    }

    /// Checks shared by all solvers. Returns the free parameter indices.
    pub(crate) fn validate(&self) -> Result<Vec<usize>, FitError> {
        let n = self.x.len();
        if n == 0 || self.y.len() != n {
            return Err(FitError::FitConvergence("no data points in the fit interval".into()));
        }
        if self.sigma.is_some_and(|s| s.len() != n) {
            return Err(FitError::FitConvergence("weights do not match the data".into()));
        }
        let free_idx = self.free_indices();
        let k = free_idx.len();
        if n < k {
            return Err(FitError::FitConvergence(format!(
                "{n} channels cannot determine {k} free parameters"
            )));
        }
        Ok(free_idx)
    }
}

/// Output of a solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Full parameter vector, validated by the model.
    pub values: Vec<f64>,
    pub chi_squared: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// A nonlinear least-squares routine.
pub trait Optimizer: Send + Sync {
    fn optimize(&self, problem: &Problem<'_>) -> Result<Solution, FitError>;
}

/// Reduced chi-squared of `params` on the problem data.
pub fn chi_squared(problem: &Problem<'_>, params: &[f64]) -> f64 {
    let r = problem.residuals(params);
    let free = problem.fit_mask.iter().filter(|f| **f).count();
    reduced(r.norm_squared(), problem.x.len(), free)
}

pub(crate) fn reduced(sse: f64, n: usize, free: usize) -> f64 {
    let dof = n.saturating_sub(free).max(1);
    sse / dof as f64
}

/// Levenberg–Marquardt with multiplicative damping updates.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Stop when the relative cost decrease of an accepted step is below this.
    pub ftol: f64,
    /// Stop when the relative step length is below this.
    pub xtol: f64,
    pub initial_lambda: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

impl LevenbergMarquardt {
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Self::default()
        }
    }

    fn jacobian(
        &self,
        problem: &Problem<'_>,
        free_idx: &[usize],
        p: &[f64],
        r: &DVector<f64>,
    ) -> Option<DMatrix<f64>> {
        let n = r.len();
        let mut jac = DMatrix::<f64>::zeros(n, p.len());
        let mut shifted = p.to_vec();
        for j in 0..p.len() {
            let h = DIFF_STEP * p[j].abs().max(1e-3);
            shifted[j] = p[j] + h;
            let r_h = problem.residuals(&problem.expand(free_idx, &shifted));
            shifted[j] = p[j];
            for i in 0..n {
                jac[(i, j)] = (r_h[i] - r[i]) / h;
            }
        }
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

impl Optimizer for LevenbergMarquardt {
    fn optimize(&self, problem: &Problem<'_>) -> Result<Solution, FitError> {
        let free_idx = problem.validate()?;
        let n = problem.x.len();
        let k = free_idx.len();

        let mut p: Vec<f64> = free_idx.iter().map(|&i| problem.initial[i]).collect();
        let mut r = problem.residuals(&problem.expand(&free_idx, &p));
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Err(FitError::FitConvergence(
                "model or data is not finite in the fit interval".into(),
            ));
        }

        let mut lambda = self.initial_lambda;
        let mut iterations = 0;
        let mut converged = k == 0;

        while !converged && iterations < self.max_iterations {
            iterations += 1;
            let jac = self.jacobian(problem, &free_idx, &p, &r).ok_or_else(|| {
                FitError::FitConvergence("non-finite Jacobian".into())
            })?;
            let jtj_diag: Vec<f64> = (0..k).map(|j| jac.column(j).norm_squared().max(1e-30)).collect();

            let mut improved = false;
            let mut solved_any = false;
            while lambda <= LAMBDA_MAX {
                let mut a = DMatrix::<f64>::zeros(n + k, k);
                a.view_mut((0, 0), (n, k)).copy_from(&jac);
                for j in 0..k {
                    a[(n + j, j)] = (lambda * jtj_diag[j]).sqrt();
                }
                let mut b = DVector::<f64>::zeros(n + k);
                b.rows_mut(0, n).copy_from(&(-&r));

                let Some(delta) = solve_least_squares(&a, &b) else {
                    lambda *= 10.0;
                    continue;
                };
                solved_any = true;

                let candidate: Vec<f64> = p.iter().zip(delta.iter()).map(|(a, d)| a + d).collect();
                let r_new = problem.residuals(&problem.expand(&free_idx, &candidate));
                let cost_new = r_new.norm_squared();

                if cost_new.is_finite() && cost_new <= cost {
                    let p_norm = p.iter().map(|v| v * v).sum::<f64>().sqrt();
                    let small_step = delta.norm() <= self.xtol * (p_norm + self.xtol);
                    let small_gain = cost - cost_new <= self.ftol * cost;
                    p = candidate;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    converged = small_step || small_gain;
                    improved = true;
                    break;
                }
                lambda *= 10.0;
            }

            if !improved {
                converged = stalled(solved_any, iterations)?;
                if !converged {
                    break;
                }
            }
        }

        if !converged {
            log::warn!("Optimizer stopped after {iterations} iterations without converging.");
        }

        let values = problem.expand(&free_idx, &p);
        Ok(Solution {
            chi_squared: reduced(cost, n, k),
            values,
            iterations,
            converged,
        })
    }
}

/// Outcome of an iteration in which no damped step lowered the cost.
///
/// If some step was solvable the current point is a (local) minimum. If the
/// damped system could not be solved at any damping, the fit fails outright
/// on the first iteration and stops unconverged later on.
fn stalled(solved_any: bool, iterations: usize) -> Result<bool, FitError> {
    match (solved_any, iterations) {
        (true, _) => Ok(true),
        (false, 1) => Err(FitError::FitConvergence(
            "damped normal equations could not be solved".into(),
        )),
        (false, _) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::predict_all;

    fn lag_times() -> Vec<f64> {
        (0..80).map(|i| 1e-3 * 1.2f64.powi(i)).collect()
    }

    #[test]
    fn recovers_diffusion_parameters_from_exact_data() {
        let model = ModelKind::Diffusion3d;
        let truth = [4.0, 0.4, 5.0, 0.0];
        let x = lag_times();
        let y = predict_all(model, &x, &truth);
        let initial = [2.5, 0.1, 5.0, 0.0];
        let mask = [true, true, false, false];
        let problem = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &x,
            y: &y,
            sigma: None,
        };

        let solution = LevenbergMarquardt::default().optimize(&problem).unwrap();
        assert!(solution.converged);
        assert!((solution.values[0] - 4.0).abs() < 1e-6, "{:?}", solution.values);
        assert!((solution.values[1] - 0.4).abs() < 1e-6, "{:?}", solution.values);
        assert_eq!(solution.values[2], 5.0);
        assert_eq!(solution.values[3], 0.0);
        assert!(solution.chi_squared < 1e-16);
    }

    #[test]
    fn weights_are_applied() {
        let model = ModelKind::Diffusion2d;
        let x = lag_times();
        let y = predict_all(model, &x, &[4.0, 0.4, 0.0]);
        let sigma = vec![0.5; x.len()];
        let initial = [4.0, 0.4, 0.01];
        let mask = [false, false, false];
        let unweighted = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &x,
            y: &y,
            sigma: None,
        };
        let weighted = Problem {
            sigma: Some(&sigma),
            ..unweighted
        };
        let a = chi_squared(&unweighted, &initial);
        let b = chi_squared(&weighted, &initial);
        assert!((b - 4.0 * a).abs() < 1e-12);
    }

    #[test]
    fn nothing_to_fit_returns_validated_initial_values() {
        let model = ModelKind::Diffusion2d;
        let x = lag_times();
        let y = predict_all(model, &x, &[4.0, 0.4, 0.0]);
        let initial = [-4.0, 0.4, 0.0];
        let mask = [false; 3];
        let problem = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &x,
            y: &y,
            sigma: None,
        };
        let solution = LevenbergMarquardt::default().optimize(&problem).unwrap();
        assert_eq!(solution.values, vec![4.0, 0.4, 0.0]);
        assert_eq!(solution.iterations, 0);
        assert!(solution.chi_squared < 1e-24);
    }

    #[test]
    fn non_finite_data_is_a_convergence_error() {
        let model = ModelKind::Diffusion2d;
        let x = lag_times();
        let mut y = predict_all(model, &x, &[4.0, 0.4, 0.0]);
        y[3] = f64::NAN;
        let initial = model.default_values();
        let mask = model.default_fit_mask();
        let problem = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &x,
            y: &y,
            sigma: None,
        };
        assert!(matches!(
            LevenbergMarquardt::default().optimize(&problem),
            Err(FitError::FitConvergence(_))
        ));
    }

    #[test]
    fn unsolvable_steps_are_not_reported_as_converged() {
        assert!(stalled(true, 1).unwrap());
        assert!(stalled(true, 7).unwrap());
        assert!(matches!(stalled(false, 1), Err(FitError::FitConvergence(_))));
        assert!(!stalled(false, 7).unwrap());
    }

    #[test]
    fn empty_interval_is_a_convergence_error() {
        let model = ModelKind::Diffusion2d;
        let initial = model.default_values();
        let mask = model.default_fit_mask();
        let problem = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &[],
            y: &[],
            sigma: None,
        };
        assert!(LevenbergMarquardt::default().optimize(&problem).is_err());
    }
}
