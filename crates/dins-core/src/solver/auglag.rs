//! Augmented-Lagrangian outer loop over `argmin`'s L-BFGS.
//!
//! Equality constraints and box bounds are folded into a merit function:
//! each equality `c_j(x) = 0` contributes `lambda_j c_j + rho/2 c_j^2`, each
//! bound side, as the inequality `g_k(x) <= 0`, contributes
//! `rho/2 max(0, mu_k/rho + g_k)^2`. The merit is handed to `argmin` as an
//! unconstrained problem (L-BFGS, More-Thuente line search, central-difference
//! gradients); multipliers are updated after each inner solve and the penalty
//! grows when the violation stalls.

use argmin::core::{CostFunction, Error, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;

use super::types::{
    Bound, ConstrainedMinimizer, EqualityConstraint, MinimizeOutcome, MinimizeProblem,
    SolverError,
};

#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Iteration cap for each inner L-BFGS solve.
    pub max_inner_iterations: u64,
    /// Number of multiplier-update rounds when constraints or bounds exist.
    pub outer_rounds: usize,
    /// L-BFGS history length.
    pub memory: usize,
    /// Gradient-norm tolerance handed to the inner L-BFGS.
    pub gradient_tolerance: f64,
    /// Cost-change tolerance handed to the inner L-BFGS.
    pub cost_tolerance: f64,
    /// Starting quadratic penalty weight.
    pub initial_penalty: f64,
    /// Penalty multiplier applied when the violation fails to shrink.
    pub penalty_growth: f64,
    /// Constraint violation below which the outer loop stops.
    pub constraint_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_inner_iterations: 200,
            outer_rounds: 10,
            memory: 8,
            gradient_tolerance: 1.0e-8,
            cost_tolerance: f64::EPSILON,
            initial_penalty: 1.0e2,
            penalty_growth: 10.0,
            constraint_tolerance: 1.0e-10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AugmentedLagrangianSolver {
    options: SolverOptions,
}

impl AugmentedLagrangianSolver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }
}

/// One side of a box bound, as the inequality `violation(x) <= 0`.
#[derive(Debug, Clone, Copy)]
struct BoundFace {
    parameter: usize,
    limit: f64,
    is_lower: bool,
}

impl BoundFace {
    fn violation(&self, params: &[f64]) -> f64 {
        if self.is_lower {
            self.limit - params[self.parameter]
        } else {
            params[self.parameter] - self.limit
        }
    }
}

fn bound_faces(bounds: &[Bound]) -> Vec<BoundFace> {
    let mut faces = Vec::new();
    for (parameter, bound) in bounds.iter().enumerate() {
        if let Some(limit) = bound.lower {
            faces.push(BoundFace {
                parameter,
                limit,
                is_lower: true,
            });
        }
        if let Some(limit) = bound.upper {
            faces.push(BoundFace {
                parameter,
                limit,
                is_lower: false,
            });
        }
    }
    faces
}

/// Merit function of one outer round, exposed to `argmin` as an
/// unconstrained minimization problem.
struct MeritProblem<'a> {
    objective: &'a (dyn Fn(&[f64]) -> f64 + Sync),
    constraints: &'a [&'a dyn EqualityConstraint],
    multipliers: &'a [f64],
    faces: &'a [BoundFace],
    face_multipliers: &'a [f64],
    penalty: f64,
}

impl MeritProblem<'_> {
    fn value(&self, params: &[f64]) -> f64 {
        let mut value = (self.objective)(params);
        for (constraint, &lambda) in self.constraints.iter().zip(self.multipliers) {
            let c = constraint.residual(params);
            value += lambda * c + 0.5 * self.penalty * c * c;
        }
        for (face, &mu) in self.faces.iter().zip(self.face_multipliers) {
            let shifted = mu / self.penalty + face.violation(params);
            if shifted > 0.0 {
                value += 0.5 * self.penalty * shifted * shifted;
            }
        }
        value
    }
}

impl CostFunction for MeritProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.value(params))
    }
}

impl Gradient for MeritProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> Result<Self::Gradient, Error> {
        Ok(params.central_diff(&|p: &Vec<f64>| self.value(p)))
    }
}

impl ConstrainedMinimizer for AugmentedLagrangianSolver {
    fn minimize(&self, problem: &MinimizeProblem<'_>) -> Result<MinimizeOutcome, SolverError> {
        problem.validate()?;

        let options = &self.options;
        let mut x = project(problem.initial, problem.bounds);
        if !(problem.objective)(&x).is_finite() {
            return Ok(MinimizeOutcome {
                residual: (problem.objective)(&x),
                params: x,
                iterations: 0,
            });
        }

        let faces = bound_faces(problem.bounds);
        let constraint_count = problem.constraints.len();
        let mut multipliers = vec![0.0; constraint_count];
        let mut face_multipliers = vec![0.0; faces.len()];
        let mut penalty = options.initial_penalty;
        let mut previous_violation = f64::INFINITY;
        let unconstrained = constraint_count == 0 && faces.is_empty();
        let outer_rounds = if unconstrained { 1 } else { options.outer_rounds };

        let mut total_iterations = 0_u64;
        for _ in 0..outer_rounds {
            let merit = MeritProblem {
                objective: problem.objective,
                constraints: problem.constraints,
                multipliers: &multipliers,
                faces: &faces,
                face_multipliers: &face_multipliers,
                penalty,
            };
            match run_inner(options, merit, x.clone())? {
                Some((best, inner_iterations)) => {
                    x = best;
                    total_iterations += inner_iterations;
                }
                None => break,
            }

            if unconstrained {
                break;
            }

            let mut violation = 0.0_f64;
            for (j, constraint) in problem.constraints.iter().enumerate() {
                let c = constraint.residual(&x);
                multipliers[j] += penalty * c;
                violation = violation.max(c.abs());
            }
            for (k, face) in faces.iter().enumerate() {
                let g = face.violation(&x);
                face_multipliers[k] = (face_multipliers[k] + penalty * g).max(0.0);
                violation = violation.max(g.max(0.0));
            }
            if !violation.is_finite() || violation <= options.constraint_tolerance {
                break;
            }
            if violation > 0.25 * previous_violation {
                penalty *= options.penalty_growth;
            }
            previous_violation = violation;
        }

        let params = project(&x, problem.bounds);
        Ok(MinimizeOutcome {
            residual: (problem.objective)(&params),
            params,
            iterations: total_iterations,
        })
    }
}

/// One inner L-BFGS solve of the current merit. A failed line search is not
/// fatal; `None` tells the outer loop to stop with the point it already has.
fn run_inner(
    options: &SolverOptions,
    merit: MeritProblem<'_>,
    start: Vec<f64>,
) -> Result<Option<(Vec<f64>, u64)>, SolverError> {
    let solver = LBFGS::new(MoreThuenteLineSearch::new(), options.memory)
        .with_tolerance_grad(options.gradient_tolerance)
        .map_err(configuration_error)?
        .with_tolerance_cost(options.cost_tolerance)
        .map_err(configuration_error)?;
    let executor = Executor::new(merit, solver).configure(|state| {
        state
            .param(start.clone())
            .max_iters(options.max_inner_iterations)
    });
    match executor.run() {
        Ok(result) => {
            let mut state = result.state().clone();
            let iterations = state.get_iter();
            let best = state.take_best_param().unwrap_or(start);
            Ok(Some((best, iterations)))
        }
        Err(_) => Ok(None),
    }
}

fn configuration_error(error: Error) -> SolverError {
    SolverError::Configuration {
        reason: error.to_string(),
    }
}

fn project(x: &[f64], bounds: &[Bound]) -> Vec<f64> {
    x.iter()
        .zip(bounds)
        .map(|(&value, bound)| bound.clamp(value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::types::{Bound, EqualityConstraint, MinimizeProblem};
    use super::*;

    fn solve(
        objective: &(dyn Fn(&[f64]) -> f64 + Sync),
        initial: &[f64],
        bounds: &[Bound],
        constraints: &[&dyn EqualityConstraint],
    ) -> MinimizeOutcome {
        let solver = AugmentedLagrangianSolver::default();
        solver
            .minimize(&MinimizeProblem {
                objective,
                initial,
                bounds,
                constraints,
            })
            .expect("well-formed problem should solve")
    }

    #[test]
    fn unconstrained_quadratic_reaches_its_minimum() {
        let objective = |p: &[f64]| (p[0] - 3.0).powi(2) + 2.0 * (p[1] + 1.0).powi(2);
        let outcome = solve(
            &objective,
            &[0.0, 0.0],
            &[Bound::free(), Bound::free()],
            &[],
        );
        assert!((outcome.params[0] - 3.0).abs() < 1.0e-5);
        assert!((outcome.params[1] + 1.0).abs() < 1.0e-5);
        assert!(outcome.residual < 1.0e-9);
        assert!(outcome.iterations > 0);
    }

    #[test]
    fn active_bound_pins_the_solution() {
        let objective = |p: &[f64]| (p[0] - 3.0).powi(2);
        let outcome = solve(&objective, &[0.5], &[Bound::new(0.0, 1.0)], &[]);
        assert!((outcome.params[0] - 1.0).abs() < 1.0e-8);
        assert!((outcome.residual - 4.0).abs() < 1.0e-6);
    }

    struct SumToOne;
    impl EqualityConstraint for SumToOne {
        fn residual(&self, params: &[f64]) -> f64 {
            params[0] + params[1] - 1.0
        }
    }

    #[test]
    fn equality_constraint_is_satisfied_at_the_optimum() {
        // min x^2 + y^2 s.t. x + y = 1 has the analytic solution (0.5, 0.5).
        let objective = |p: &[f64]| p[0] * p[0] + p[1] * p[1];
        let outcome = solve(
            &objective,
            &[0.9, 0.0],
            &[Bound::new(0.0, None), Bound::new(0.0, None)],
            &[&SumToOne],
        );
        assert!((outcome.params[0] - 0.5).abs() < 1.0e-4, "{:?}", outcome.params);
        assert!((outcome.params[1] - 0.5).abs() < 1.0e-4, "{:?}", outcome.params);
    }

    #[test]
    fn infeasible_start_is_projected_into_the_box() {
        let objective = |p: &[f64]| p[0] * p[0];
        let outcome = solve(&objective, &[-5.0], &[Bound::new(1.0, 4.0)], &[]);
        assert!((outcome.params[0] - 1.0).abs() < 1.0e-8);
    }

    #[test]
    fn nan_objective_returns_the_projected_start() {
        let objective = |_: &[f64]| f64::NAN;
        let outcome = solve(&objective, &[2.0], &[Bound::new(0.0, 1.0)], &[]);
        assert_eq!(outcome.params, vec![1.0]);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.residual.is_nan());
    }
}
