//! Neutron Compton profile synthesis on the TOF grid of one detector.
//!
//! For every trial parameter set the line shape is rebuilt from scratch: the
//! resolution widths are re-anchored at the trial centre, the pseudo-Voigt is
//! evaluated in the momentum coordinate and the final-state correction is
//! added before conversion back to count space.

use serde::{Deserialize, Serialize};

use crate::common::constants::{ENERGY_EFFICIENCY_EXPONENT, FSE_SCALE};
use crate::domain::{InstrumentParamRow, NcpParams, ResolutionParamRow};
use crate::kinematics::{KinematicArrays, compute_kinematics, y_transform};
use crate::numerics::pseudo_voigt::pseudo_voigt_profile;
use crate::numerics::stencil::third_derivative;
use crate::resolution::{peak_anchor_index, resolution_widths};

/// Everything about one detector that stays fixed across solver trials:
/// geometry, resolution parameters, kinematics and the momentum grid of each
/// mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSetup {
    pub instrument: InstrumentParamRow,
    pub resolution: ResolutionParamRow,
    pub kinematics: KinematicArrays,
    pub yspaces: Vec<Vec<f64>>,
}

impl DetectorSetup {
    pub fn prepare(
        tof: &[f64],
        instrument: InstrumentParamRow,
        resolution: ResolutionParamRow,
        masses: &[f64],
    ) -> Self {
        let kinematics = compute_kinematics(tof, &instrument);
        let yspaces = masses
            .iter()
            .map(|&mass| y_transform(mass, &kinematics))
            .collect();
        Self {
            instrument,
            resolution,
            kinematics,
            yspaces,
        }
    }

    pub fn grid_len(&self) -> usize {
        self.kinematics.len()
    }
}

/// Synthesized profiles on the TOF grid: one curve per mass plus their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedProfiles {
    pub per_mass: Vec<Vec<f64>>,
    pub total: Vec<f64>,
}

/// Builds the profile of every mass for one trial parameter set and sums
/// them. `params` and `masses` pair up index by index.
pub fn synthesize(
    params: &[NcpParams],
    masses: &[f64],
    setup: &DetectorSetup,
) -> SynthesizedProfiles {
    let n = setup.grid_len();
    let mut per_mass = Vec::with_capacity(masses.len());
    let mut total = vec![0.0; n];

    for (mass_index, (&mass, p)) in masses.iter().zip(params).enumerate() {
        let yspace = &setup.yspaces[mass_index];

        let anchor = peak_anchor_index(yspace, p.center);
        let widths = resolution_widths(
            mass,
            setup.kinematics.point(anchor),
            &setup.resolution,
            &setup.instrument,
        );
        let total_gauss_width = (p.width * p.width + widths.gaussian * widths.gaussian).sqrt();

        let offsets: Vec<f64> = yspace.iter().map(|&y| y - p.center).collect();
        let line_shape = pseudo_voigt_profile(&offsets, total_gauss_width, widths.lorentzian);
        let curvature = third_derivative(yspace, &line_shape);

        let width4 = p.width.powi(4);
        let mut profile = Vec::with_capacity(n);
        for i in 0..n {
            let delta_q = setup.kinematics.delta_q[i];
            let e0 = setup.kinematics.e0[i];
            let final_state = -curvature[i] * width4 / delta_q * FSE_SCALE;
            let value = p.intensity
                * (line_shape[i] + final_state)
                * e0
                * e0.powf(ENERGY_EFFICIENCY_EXPONENT)
                * mass
                / delta_q;
            total[i] += value;
            profile.push(value);
        }
        per_mass.push(profile);
    }

    SynthesizedProfiles { per_mass, total }
}

#[cfg(test)]
mod tests {
    use super::{DetectorSetup, synthesize};
    use crate::domain::NcpParams;
    use crate::instrument::FORWARD_SCATTERING_RESOLUTION;
    use crate::domain::InstrumentParamRow;
    use crate::resolution::peak_anchor_index;

    fn setup(masses: &[f64]) -> DetectorSetup {
        let tof: Vec<f64> = (0..=150).map(|i| 110.0 + 2.0 * i as f64).collect();
        let instrument = InstrumentParamRow {
            detector_number: 164,
            scattering_angle: 66.0,
            t0: 0.0,
            l0: 11.0,
            l1: 0.7,
        };
        DetectorSetup::prepare(&tof, instrument, FORWARD_SCATTERING_RESOLUTION, masses)
    }

    fn params(intensity: f64, width: f64, center: f64) -> NcpParams {
        NcpParams {
            intensity,
            width,
            center,
        }
    }

    #[test]
    fn total_is_the_sum_over_masses() {
        let masses = [1.0079, 27.0];
        let setup = setup(&masses);
        let trial = [params(0.9, 5.0, 0.0), params(0.1, 13.0, 0.0)];
        let profiles = synthesize(&trial, &masses, &setup);
        assert_eq!(profiles.per_mass.len(), 2);
        for i in 0..setup.grid_len() {
            let sum = profiles.per_mass[0][i] + profiles.per_mass[1][i];
            assert!((profiles.total[i] - sum).abs() < 1.0e-12);
        }
    }

    #[test]
    fn intensity_scales_the_profile_linearly() {
        let masses = [12.0];
        let setup = setup(&masses);
        let one = synthesize(&[params(1.0, 12.0, 0.0)], &masses, &setup);
        let three = synthesize(&[params(3.0, 12.0, 0.0)], &masses, &setup);
        for (a, b) in one.total.iter().zip(&three.total) {
            assert!((b - 3.0 * a).abs() < 1.0e-9 * a.abs().max(1.0));
        }
    }

    #[test]
    fn profile_peaks_near_the_trial_centre() {
        let masses = [12.0];
        let setup = setup(&masses);
        let profiles = synthesize(&[params(1.0, 12.0, 0.0)], &masses, &setup);
        let peak = profiles
            .total
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("profile is non-empty");
        let anchor = peak_anchor_index(&setup.yspaces[0], 0.0);
        assert!(
            peak.abs_diff(anchor) <= 3,
            "peak at {peak}, recoil bin at {anchor}"
        );
    }
}
