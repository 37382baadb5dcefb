//! Pseudo-Voigt line shape: analytic approximation to the convolution of a
//! Gaussian (std `sigma`) and a Lorentzian (HWHM `gamma`), both centred at
//! zero and unit-normalised.

use std::f64::consts::PI;

/// Unit-area Gaussian with standard deviation `sigma`, centred at zero.
pub fn gaussian(x: f64, sigma: f64) -> f64 {
    (-x * x / (2.0 * sigma * sigma)).exp() / ((2.0 * PI).sqrt() * sigma)
}

/// Unit-area Lorentzian with half-width `gamma`, centred at zero.
pub fn lorentzian(x: f64, gamma: f64) -> f64 {
    gamma / PI / (x * x + gamma * gamma)
}

/// Mixing fraction and effective widths of the pseudo-Voigt approximation.
///
/// Uses the standard FWHM combination `f = 0.5346 fl + sqrt(0.2166 fl^2 + fg^2)`
/// and the cubic eta polynomial in `fl/f`.
fn mixing(sigma: f64, gamma: f64) -> (f64, f64, f64) {
    let two_sqrt_2ln2 = 2.0 * (2.0 * (2.0_f64).ln()).sqrt();
    let fg = sigma * two_sqrt_2ln2;
    let fl = 2.0 * gamma;
    let f = 0.5346 * fl + (0.2166 * fl * fl + fg * fg).sqrt();
    let ratio = fl / f;
    let eta = 1.36603 * ratio - 0.47719 * ratio * ratio + 0.11116 * ratio * ratio * ratio;
    (eta, f / two_sqrt_2ln2, f / 2.0)
}

/// Pseudo-Voigt value at `x`.
pub fn pseudo_voigt(x: f64, sigma: f64, gamma: f64) -> f64 {
    let (eta, sigma_v, gamma_v) = mixing(sigma, gamma);
    eta * lorentzian(x, gamma_v) + (1.0 - eta) * gaussian(x, sigma_v)
}

/// Evaluates the pseudo-Voigt over a grid of offsets.
pub fn pseudo_voigt_profile(offsets: &[f64], sigma: f64, gamma: f64) -> Vec<f64> {
    let (eta, sigma_v, gamma_v) = mixing(sigma, gamma);
    offsets
        .iter()
        .map(|&x| eta * lorentzian(x, gamma_v) + (1.0 - eta) * gaussian(x, sigma_v))
        .collect()
}
