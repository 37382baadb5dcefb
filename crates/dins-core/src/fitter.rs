//! Single-spectrum fit: least squares between the measured counts and the
//! synthesized profile, subject to the configured bounds and stoichiometric
//! constraints.

use crate::common::config::ReductionConfig;
use crate::domain::{FitResult, intensity_position, unpack_params};
use crate::profile::{DetectorSetup, synthesize};
use crate::solver::{
    Bound, ConstrainedMinimizer, EqualityConstraint, MinimizeProblem, SolverError,
};

/// Solver-facing view of the configured mass models: starting vector, flat
/// bounds and intensity-ratio constraints. Built once per run and shared by
/// every detector fit.
#[derive(Debug, Clone)]
pub struct FitModel {
    masses: Vec<f64>,
    initial: Vec<f64>,
    bounds: Vec<Bound>,
    constraints: Vec<RatioConstraint>,
}

/// `intensity[numerator] - ratio * intensity[denominator] == 0` in the flat
/// parameter layout.
#[derive(Debug, Clone, Copy)]
struct RatioConstraint {
    numerator: usize,
    denominator: usize,
    ratio: f64,
}

impl EqualityConstraint for RatioConstraint {
    fn residual(&self, params: &[f64]) -> f64 {
        params[self.numerator] - self.ratio * params[self.denominator]
    }
}

impl FitModel {
    pub fn from_config(config: &ReductionConfig) -> Self {
        let mut initial = Vec::with_capacity(config.masses.len() * 3);
        let mut bounds = Vec::with_capacity(config.masses.len() * 3);
        for model in &config.masses {
            initial.push(model.initial_intensity);
            initial.push(model.initial_width);
            initial.push(model.initial_center);
            bounds.push(Bound::new(model.intensity_bounds.lower, model.intensity_bounds.upper));
            bounds.push(Bound::new(model.width_bounds.lower, model.width_bounds.upper));
            bounds.push(Bound::new(model.center_bounds.lower, model.center_bounds.upper));
        }
        let constraints = config
            .constraints
            .iter()
            .map(|c| RatioConstraint {
                numerator: intensity_position(c.numerator_mass),
                denominator: intensity_position(c.denominator_mass),
                ratio: c.ratio,
            })
            .collect();
        Self {
            masses: config.mass_values(),
            initial,
            bounds,
            constraints,
        }
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn mass_count(&self) -> usize {
        self.masses.len()
    }

    pub fn param_count(&self) -> usize {
        self.initial.len()
    }
}

/// Sum of squared residuals, weighted by the squared errors whenever the
/// error array carries any weight at all. The unweighted branch keeps
/// detectors with an all-zero error column fittable.
fn chi_square(model_values: &[f64], values: &[f64], errors: &[f64]) -> f64 {
    let weighted = errors.iter().sum::<f64>() > 0.0;
    let mut sum = 0.0;
    for i in 0..values.len() {
        let residual = model_values[i] - values[i];
        if weighted {
            sum += residual * residual / (errors[i] * errors[i]);
        } else {
            sum += residual * residual;
        }
    }
    sum
}

/// Fits one detector's point data.
///
/// An all-zero value array short-circuits to the NaN-sentinel result without
/// invoking the solver. The solver's outcome is reported as-is: the residual
/// is divided by the degrees of freedom and no retry happens on a poor fit.
pub fn fit_spectrum(
    values: &[f64],
    errors: &[f64],
    setup: &DetectorSetup,
    model: &FitModel,
    minimizer: &dyn ConstrainedMinimizer,
) -> Result<FitResult, SolverError> {
    let detector_number = setup.instrument.detector_number;
    if values.iter().all(|&v| v == 0.0) {
        return Ok(FitResult::masked(detector_number, model.mass_count()));
    }

    let objective = move |flat: &[f64]| {
        let trial = unpack_params(flat);
        let profiles = synthesize(&trial, &model.masses, setup);
        chi_square(&profiles.total, values, errors)
    };
    let constraint_refs: Vec<&dyn EqualityConstraint> = model
        .constraints
        .iter()
        .map(|c| c as &dyn EqualityConstraint)
        .collect();

    let outcome = minimizer.minimize(&MinimizeProblem {
        objective: &objective,
        initial: &model.initial,
        bounds: &model.bounds,
        constraints: &constraint_refs,
    })?;

    let degrees_of_freedom = values.len() as f64 - model.param_count() as f64;
    Ok(FitResult {
        detector_number,
        params: unpack_params(&outcome.params),
        reduced_chi_square: outcome.residual / degrees_of_freedom,
        solver_iterations: outcome.iterations as f64,
    })
}

/// Profile rebuilt from a finished fit, for reporting and background work.
pub fn fitted_profiles(
    fit: &FitResult,
    model: &FitModel,
    setup: &DetectorSetup,
) -> crate::profile::SynthesizedProfiles {
    synthesize(&fit.params, &model.masses, setup)
}
