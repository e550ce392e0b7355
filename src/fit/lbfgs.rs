//! L-BFGS backend for the `Optimizer` trait, built on `argmin`.
//!
//! It minimizes the plain sum of squared residuals over the free parameters.
//! The gradient is taken by central differences of that sum. Levenberg–Marquardt
//! remains the default because it exploits the least-squares structure; this
//! solver is the alternative when a quasi-Newton method is preferred.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;

use crate::error::FitError;
use crate::fit::optimizer::{Optimizer, Problem, Solution, reduced};

/// Relative step for central differences, about `cbrt(f64::EPSILON)`.
const CENTRAL_STEP: f64 = 6.06e-6;

/// Limited-memory BFGS with a Moré–Thuente line search.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    pub max_iterations: u64,
    /// Gradient-norm tolerance; the cost tolerance is a tenth of it.
    pub tolerance: f64,
    /// Number of stored correction pairs.
    pub memory: usize,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
            memory: 10,
        }
    }
}

impl Lbfgs {
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations as u64,
            ..Self::default()
        }
    }
}

/// Sum of squared residuals as a function of the free parameters.
struct SquaredResiduals<'p, 'a> {
    problem: &'p Problem<'a>,
    free_idx: &'p [usize],
}

impl SquaredResiduals<'_, '_> {
    fn sse(&self, free: &[f64]) -> f64 {
        self.problem
            .residuals(&self.problem.expand(self.free_idx, free))
            .norm_squared()
    }
}

impl CostFunction for SquaredResiduals<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let sse = self.sse(params);
        if sse.is_finite() {
            Ok(sse)
        } else {
            Err(argmin::core::Error::msg("sum of squared residuals is not finite"))
        }
    }
}

impl Gradient for SquaredResiduals<'_, '_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let mut shifted = params.clone();
        let mut grad = Vec::with_capacity(params.len());
        for j in 0..params.len() {
            let h = CENTRAL_STEP * params[j].abs().max(1e-3);
            shifted[j] = params[j] + h;
            let plus = self.sse(&shifted);
            shifted[j] = params[j] - h;
            let minus = self.sse(&shifted);
            shifted[j] = params[j];
            let g = (plus - minus) / (2.0 * h);
            if !g.is_finite() {
                return Err(argmin::core::Error::msg("non-finite gradient"));
            }
            grad.push(g);
        }
        Ok(grad)
    }
}

impl Optimizer for Lbfgs {
    fn optimize(&self, problem: &Problem<'_>) -> Result<Solution, FitError> {
        let free_idx = problem.validate()?;
        let n = problem.x.len();
        let k = free_idx.len();

        let initial: Vec<f64> = free_idx.iter().map(|&i| problem.initial[i]).collect();
        let objective = SquaredResiduals {
            problem,
            free_idx: &free_idx,
        };
        let start_cost = objective.sse(&initial);
        if !start_cost.is_finite() {
            return Err(FitError::FitConvergence(
                "model or data is not finite in the fit interval".into(),
            ));
        }
        if k == 0 {
            return Ok(Solution {
                values: problem.expand(&free_idx, &initial),
                chi_squared: reduced(start_cost, n, k),
                iterations: 0,
                converged: true,
            });
        }

        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.memory)
            .with_tolerance_grad(self.tolerance)
            .and_then(|s| s.with_tolerance_cost(0.1 * self.tolerance))
            .map_err(|e| FitError::FitConvergence(format!("invalid L-BFGS settings: {e}")))?;

        let res = Executor::new(objective, solver)
            .configure(|state| state.param(initial).max_iters(self.max_iterations))
            .run()
            .map_err(|e| FitError::FitConvergence(format!("L-BFGS failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| FitError::FitConvergence("L-BFGS produced no parameters".into()))?;
        let converged = matches!(
            state.get_termination_status(),
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );
        let iterations = state.get_iter() as usize;
        if !converged {
            log::warn!(
                "L-BFGS stopped after {iterations} iterations: {}",
                state.get_termination_status()
            );
        }

        Ok(Solution {
            values: problem.expand(&free_idx, best),
            chi_squared: reduced(state.get_best_cost(), n, k),
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelKind, predict_all};

    fn lag_times() -> Vec<f64> {
        (0..80).map(|i| 1e-3 * 1.2f64.powi(i)).collect()
    }

    #[test]
    fn recovers_diffusion_parameters_from_exact_data() {
        let model = ModelKind::Diffusion3d;
        let x = lag_times();
        let y = predict_all(model, &x, &[4.0, 0.4, 5.0, 0.0]);
        let initial = [3.0, 0.3, 5.0, 0.0];
        let mask = [true, true, false, false];
        let problem = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &x,
            y: &y,
            sigma: None,
        };

        let solution = Lbfgs::default().optimize(&problem).unwrap();
        assert!((solution.values[0] - 4.0).abs() < 5e-2, "{:?}", solution.values);
        assert!((solution.values[1] - 0.4).abs() < 5e-3, "{:?}", solution.values);
        assert_eq!(&solution.values[2..], &[5.0, 0.0]);
        assert!(solution.chi_squared < 1e-6);
    }

    #[test]
    fn fixed_parameters_skip_the_solver() {
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
        let solution = Lbfgs::default().optimize(&problem).unwrap();
        assert_eq!(solution.values, vec![4.0, 0.4, 0.0]);
        assert_eq!(solution.iterations, 0);
        assert!(solution.converged);
    }

    #[test]
    fn shares_input_checks_with_levenberg_marquardt() {
        let model = ModelKind::Diffusion2d;
        let initial = model.default_values();
        let mask = model.default_fit_mask();
        let x = [1.0, 2.0];
        let problem = Problem {
            model,
            initial: &initial,
            fit_mask: &mask,
            x: &x,
            y: &[1.0],
            sigma: None,
        };
        assert!(matches!(
            Lbfgs::default().optimize(&problem),
            Err(FitError::FitConvergence(_))
        ));
    }
}
