//! Bounded, equality-constrained minimization.
//!
//! The fit engine talks to the solver only through [`ConstrainedMinimizer`];
//! [`AugmentedLagrangianSolver`] wraps `argmin`'s L-BFGS in an
//! augmented-Lagrangian outer loop to cover bounds and equality constraints.

mod auglag;
mod types;

pub use auglag::{AugmentedLagrangianSolver, SolverOptions};
pub use types::{
    Bound, ConstrainedMinimizer, EqualityConstraint, MinimizeOutcome, MinimizeProblem,
    SolverError,
};
