use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("minimize requires at least one parameter")]
    EmptyParameters,
    #[error("bounds length {bounds} does not match parameter length {params}")]
    BoundsLengthMismatch { bounds: usize, params: usize },
    #[error("solver configuration was rejected: {reason}")]
    Configuration { reason: String },
}

/// Box bounds for a single solver parameter; `None` leaves a side open.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bound {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bound {
    pub fn new(lower: impl Into<Option<f64>>, upper: impl Into<Option<f64>>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    pub fn free() -> Self {
        Self::default()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        let mut clamped = value;
        if let Some(lower) = self.lower
            && clamped < lower
        {
            clamped = lower;
        }
        if let Some(upper) = self.upper
            && clamped > upper
        {
            clamped = upper;
        }
        clamped
    }
}

/// Scalar equality constraint `residual(params) == 0`.
pub trait EqualityConstraint: Sync {
    fn residual(&self, params: &[f64]) -> f64;
}

/// One minimization request: objective, starting point, per-parameter box
/// bounds and equality constraints, all borrowed from the caller.
pub struct MinimizeProblem<'a> {
    pub objective: &'a (dyn Fn(&[f64]) -> f64 + Sync),
    pub initial: &'a [f64],
    pub bounds: &'a [Bound],
    pub constraints: &'a [&'a dyn EqualityConstraint],
}

impl MinimizeProblem<'_> {
    pub(super) fn validate(&self) -> Result<(), SolverError> {
        if self.initial.is_empty() {
            return Err(SolverError::EmptyParameters);
        }
        if self.bounds.len() != self.initial.len() {
            return Err(SolverError::BoundsLengthMismatch {
                bounds: self.bounds.len(),
                params: self.initial.len(),
            });
        }
        Ok(())
    }
}

/// Result of one minimization: best parameters found, the (unpenalised)
/// objective value there and the number of iterations spent.
///
/// Non-convergence is not an error; the caller judges the outcome from the
/// residual and iteration count.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeOutcome {
    pub params: Vec<f64>,
    pub residual: f64,
    pub iterations: u64,
}

/// Capability contract of the constrained solver consumed by the fit engine:
/// simultaneous box bounds and equality constraints over a smooth objective.
pub trait ConstrainedMinimizer: Sync {
    fn minimize(&self, problem: &MinimizeProblem<'_>) -> Result<MinimizeOutcome, SolverError>;
}

#[cfg(test)]
mod tests {
    use super::Bound;

    #[test]
    fn clamp_respects_open_sides() {
        assert_eq!(Bound::new(0.0, None).clamp(-1.0), 0.0);
        assert_eq!(Bound::new(0.0, None).clamp(7.0), 7.0);
        assert_eq!(Bound::new(None, 2.0).clamp(7.0), 2.0);
        assert_eq!(Bound::free().clamp(-5.0), -5.0);
    }
}
