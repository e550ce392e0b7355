//! Model evaluation for the built-in FCS correlation models.
//!
//! Units follow the usual dimensionless FCS convention: lag time in ms,
//! distances in 100 nm. Each model provides:
//! - `predict`, the pure function `G(parameters, τ)`
//! - a label table, default values and default fit flags
//! - `check_parms`, which maps arbitrary optimizer values onto physically
//!   meaningful ones (e.g. particle numbers are positive)

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Upper bound for the triplet fraction `T`; `T/(1-T)` diverges at 1.
const TRIPLET_MAX: f64 = 0.99;

/// Concrete correlation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    /// Free 2D diffusion.
    #[value(name = "6001", alias = "diffusion-2d")]
    Diffusion2d,
    /// Free 3D diffusion with a triplet component.
    #[value(name = "6011", alias = "diffusion-3d-triplet")]
    Diffusion3dTriplet,
    /// Free 3D diffusion in a Gaussian focal volume.
    #[value(name = "6012", alias = "diffusion-3d")]
    Diffusion3d,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::Diffusion2d,
        ModelKind::Diffusion3dTriplet,
        ModelKind::Diffusion3d,
    ];

    /// Numeric model id.
    pub fn id(self) -> u32 {
        match self {
            ModelKind::Diffusion2d => 6001,
            ModelKind::Diffusion3dTriplet => 6011,
            ModelKind::Diffusion3d => 6012,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Diffusion2d => "2D (Gauß)",
            ModelKind::Diffusion3dTriplet => "T+3D (Gauß)",
            ModelKind::Diffusion3d => "3D (Gauß)",
        }
    }

    /// Name of the model function.
    pub fn function_name(self) -> &'static str {
        match self {
            ModelKind::Diffusion2d => "CF_Gxy_gauss",
            ModelKind::Diffusion3dTriplet => "CF_Gxyz_gauss_3DT",
            ModelKind::Diffusion3d => "CF_Gxyz_gauss",
        }
    }

    /// Short description of the model formula.
    pub fn doc(self) -> &'static str {
        match self {
            ModelKind::Diffusion2d => {
                "Two-dimensional free diffusion with a Gaussian laser profile.\n\
                 G(τ) = offset + 1/( n * (1+τ/τ_diff) )"
            }
            ModelKind::Diffusion3dTriplet => {
                "Three-dimensional free diffusion with a Gaussian laser profile,\n\
                 including a triplet component.\n\
                 G(τ) = offset + 1/n * (1 + T/(1-T)*exp(-τ/τ_trip)) / (1+τ/τ_diff) / sqrt(1+τ/(SP²τ_diff))"
            }
            ModelKind::Diffusion3d => {
                "Three-dimensional free diffusion with a Gaussian laser profile\n\
                 (eliptical).\n\
                 G(τ) = offset + 1/( n * (1+τ/τ_diff) * sqrt(1 + τ/(SP²*τ_diff)) )"
            }
        }
    }

    /// Parameter labels, in parameter order.
    pub fn parameter_labels(self) -> &'static [&'static str] {
        match self {
            ModelKind::Diffusion2d => &["n", "τ_diff [ms]", "offset"],
            ModelKind::Diffusion3dTriplet => &["n", "T", "τ_trip [ms]", "τ_diff [ms]", "SP", "offset"],
            ModelKind::Diffusion3d => &["n", "τ_diff [ms]", "SP", "offset"],
        }
    }

    pub fn default_values(self) -> Vec<f64> {
        match self {
            ModelKind::Diffusion2d => vec![4.0, 0.4, 0.0],
            ModelKind::Diffusion3dTriplet => vec![4.0, 0.2, 0.001, 0.4, 5.0, 0.0],
            ModelKind::Diffusion3d => vec![4.0, 0.4, 5.0, 0.0],
        }
    }

    pub fn default_fit_mask(self) -> Vec<bool> {
        match self {
            ModelKind::Diffusion2d => vec![true, true, false],
            ModelKind::Diffusion3dTriplet => vec![true, true, true, true, false, false],
            ModelKind::Diffusion3d => vec![true, true, false, false],
        }
    }

    pub fn param_count(self) -> usize {
        self.parameter_labels().len()
    }

    /// Map parameters onto their physically meaningful range.
    ///
    /// Values that are already valid are returned unchanged.
    pub fn check_parms(self, values: &[f64]) -> Vec<f64> {
        let mut out = values.to_vec();
        match self {
            ModelKind::Diffusion2d => {
                out[0] = out[0].abs();
                out[1] = out[1].abs();
            }
            ModelKind::Diffusion3dTriplet => {
                out[0] = out[0].abs();
                out[1] = out[1].abs().min(TRIPLET_MAX);
                out[2] = out[2].abs();
                out[3] = out[3].abs();
                out[4] = out[4].abs();
            }
            ModelKind::Diffusion3d => {
                out[0] = out[0].abs();
                out[1] = out[1].abs();
                out[2] = out[2].abs();
            }
        }
        out
    }

    /// Parameters in display units: `(label, value)`.
    pub fn human_readable(self, values: &[f64]) -> Vec<(String, f64)> {
        match self {
            ModelKind::Diffusion3dTriplet => {
                let labels = ["n", "T", "τ_trip [µs]", "τ_diff [ms]", "SP", "offset"];
                let factors = [1.0, 1.0, 1000.0, 1.0, 1.0, 1.0];
                labels
                    .iter()
                    .zip(factors)
                    .zip(values)
                    .map(|((l, f), v)| (l.to_string(), v * f))
                    .collect()
            }
            _ => self
                .parameter_labels()
                .iter()
                .zip(values)
                .map(|(l, v)| (l.to_string(), *v))
                .collect(),
        }
    }

    /// Quantities derived from the parameters.
    pub fn supplementary(self, values: &[f64]) -> Vec<(String, f64)> {
        let n = values[0];
        let mut out = vec![("Amplitude G(0)-offset".to_string(), 1.0 / n)];
        if self == ModelKind::Diffusion3dTriplet {
            // Particles in the dark state do not contribute to the amplitude.
            out.push(("n (bright)".to_string(), n * (1.0 - values[1])));
        }
        out
    }
}

/// Evaluate `G(τ)` for the given model and parameter vector.
///
/// # Panics
/// Panics if `params` is shorter than `model.param_count()`.
pub fn predict(model: ModelKind, tau: f64, params: &[f64]) -> f64 {
    match model {
        ModelKind::Diffusion2d => {
            let (n, tau_diff, offset) = (params[0], params[1], params[2]);
            offset + 1.0 / (n * (1.0 + tau / tau_diff))
        }
        ModelKind::Diffusion3dTriplet => {
            let (n, t, tau_trip, tau_diff, sp, offset) =
                (params[0], params[1], params[2], params[3], params[4], params[5]);
            let triplet = if t == 0.0 {
                1.0
            } else {
                1.0 + t / (1.0 - t) * (-tau / tau_trip).exp()
            };
            offset + triplet * diffusion_3d(tau, n, tau_diff, sp)
        }
        ModelKind::Diffusion3d => {
            let (n, tau_diff, sp, offset) = (params[0], params[1], params[2], params[3]);
            offset + diffusion_3d(tau, n, tau_diff, sp)
        }
    }
}

/// Evaluate the model on every lag time.
pub fn predict_all(model: ModelKind, taus: &[f64], params: &[f64]) -> Vec<f64> {
    taus.iter().map(|&t| predict(model, t, params)).collect()
}

fn diffusion_3d(tau: f64, n: f64, tau_diff: f64, sp: f64) -> f64 {
    let lateral = 1.0 + tau / tau_diff;
    let axial = (1.0 + tau / (sp * sp * tau_diff)).sqrt();
    1.0 / (n * lateral * axial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_at_zero_lag_is_inverse_particle_number() {
        for model in ModelKind::ALL {
            let mut params = model.default_values();
            if model == ModelKind::Diffusion3dTriplet {
                params[1] = 0.0;
            }
            let g0 = predict(model, 0.0, &params);
            assert!((g0 - 0.25).abs() < 1e-12, "{model:?}: {g0}");
        }
    }

    #[test]
    fn curves_decay_with_lag_time() {
        for model in ModelKind::ALL {
            let params = model.default_values();
            let a = predict(model, 0.01, &params);
            let b = predict(model, 10.0, &params);
            assert!(a > b);
        }
    }

    #[test]
    fn label_tables_match_defaults() {
        for model in ModelKind::ALL {
            assert_eq!(model.parameter_labels().len(), model.default_values().len());
            assert_eq!(model.parameter_labels().len(), model.default_fit_mask().len());
            assert_eq!(ModelKind::from_id(model.id()), Some(model));
        }
    }

    #[test]
    fn check_parms_makes_values_physical() {
        let checked = ModelKind::Diffusion3dTriplet.check_parms(&[-4.0, 1.5, -0.001, -0.4, -5.0, -0.1]);
        assert_eq!(checked, vec![4.0, 0.99, 0.001, 0.4, 5.0, -0.1]);

        let valid = ModelKind::Diffusion3d.default_values();
        assert_eq!(ModelKind::Diffusion3d.check_parms(&valid), valid);
    }

    #[test]
    fn triplet_times_are_shown_in_microseconds() {
        let values = ModelKind::Diffusion3dTriplet.default_values();
        let readable = ModelKind::Diffusion3dTriplet.human_readable(&values);
        assert_eq!(readable[2].0, "τ_trip [µs]");
        assert!((readable[2].1 - 1.0).abs() < 1e-12);
    }
}
