//! Fixed instrument and physical constants of the inverse-geometry DINS
//! spectrometer.
//!
//! These are properties of the instrument, not tunable per run: the final
//! neutron energy is selected by the gold-foil analyser and the remaining
//! values follow from it.

/// Neutron mass in atomic mass units.
pub const NEUTRON_MASS_AMU: f64 = 1.008;

/// Final neutron energy selected by the analyser foil, in meV.
pub const FINAL_ENERGY_MEV: f64 = 4906.0;

/// Conversion factor between neutron speed (m/us) and sqrt(energy in meV).
pub const ENERGY_TO_VELOCITY: f64 = 4.3737e-4;

/// Reduced Planck constant in the mixed meV/angstrom/amu unit system used
/// throughout the kinematic formulas.
pub const HBAR: f64 = 2.0445;

/// Empirical scale of the final-state-effects correction term.
pub const FSE_SCALE: f64 = 0.72;

/// Exponent of the incident-energy efficiency factor `E0 * E0^(-0.92)`.
pub const ENERGY_EFFICIENCY_EXPONENT: f64 = -0.92;

/// Detector numbers below this threshold belong to the back-scattering bank;
/// numbers at or above it belong to the forward-scattering bank.
pub const FORWARD_SCATTERING_THRESHOLD: u32 = 135;

/// Final neutron speed in m/us.
pub fn final_velocity() -> f64 {
    FINAL_ENERGY_MEV.sqrt() * ENERGY_TO_VELOCITY
}

#[cfg(test)]
mod tests {
    use super::{
        ENERGY_TO_VELOCITY, FINAL_ENERGY_MEV, FSE_SCALE, HBAR, NEUTRON_MASS_AMU, final_velocity,
    };

    #[test]
    fn constants_remain_finite_and_positive() {
        for value in [
            NEUTRON_MASS_AMU,
            FINAL_ENERGY_MEV,
            ENERGY_TO_VELOCITY,
            HBAR,
            FSE_SCALE,
        ] {
            assert!(value.is_finite());
            assert!(value > 0.0);
        }
    }

    #[test]
    fn final_velocity_matches_energy_conversion() {
        let vf = final_velocity();
        assert!((vf / ENERGY_TO_VELOCITY).powi(2) - FINAL_ENERGY_MEV < 1.0e-9);
        assert!(vf > 0.03 && vf < 0.031, "vf was {vf}");
    }
}
