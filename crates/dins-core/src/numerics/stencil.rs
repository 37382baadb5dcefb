//! Third-derivative estimation on a (nearly) uniform grid.
//!
//! Twelfth-order centred finite-difference stencil over six neighbours on
//! each side. The six bins at each boundary receive a derivative of exactly
//! zero; this truncation is part of the established line-shape behaviour and
//! must not be widened.

/// Number of boundary bins on each side whose derivative is forced to zero.
pub const STENCIL_HALF_WIDTH: usize = 6;

/// Third derivative of `values` over the grid `x`. Returns an array of the
/// same length, zero inside the `STENCIL_HALF_WIDTH` boundary bands.
///
/// The step size is taken locally as `x[i+1] - x[i]` at every interior point,
/// matching the original evaluation on per-detector TOF-derived grids.
pub fn third_derivative(x: &[f64], values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut derivative = vec![0.0; n];
    if n < 2 * STENCIL_HALF_WIDTH + 1 || x.len() != n {
        return derivative;
    }

    for i in STENCIL_HALF_WIDTH..n - STENCIL_HALF_WIDTH {
        let k6 = (-values[i + 6] + values[i - 6]) * 1.0;
        let k5 = (values[i + 5] - values[i - 5]) * 24.0;
        let k4 = (-values[i + 4] + values[i - 4]) * 192.0;
        let k3 = (values[i + 3] - values[i - 3]) * 488.0;
        let k2 = (values[i + 2] - values[i - 2]) * 387.0;
        let k1 = (-values[i + 1] + values[i - 1]) * 1584.0;

        let step = x[i + 1] - x[i];
        derivative[i] = (k1 + k2 + k3 + k4 + k5 + k6) / step.powi(3) / 12.0_f64.powi(3);
    }
    derivative
}
