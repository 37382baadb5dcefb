//! Resolution widths in the momentum coordinate.
//!
//! The instrument response is linearised around the bin where each mass peaks
//! (the point of its momentum grid closest to the trial centre) and folded
//! into a Gaussian and a Lorentzian width per mass. The partial derivatives
//! below are the established analytic forms and are kept verbatim, including
//! the `|Ef/E0 cos(theta) - 1|` factor on the time and path terms and the
//! sign flip between the Gaussian and Lorentzian energy derivatives.

use crate::common::constants::{FINAL_ENERGY_MEV, HBAR, NEUTRON_MASS_AMU};
use crate::domain::{InstrumentParamRow, ResolutionParamRow};
use crate::kinematics::KinematicPoint;

/// Gaussian standard deviation and Lorentzian half-width, both in the
/// momentum coordinate of the mass they were computed for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionWidths {
    pub gaussian: f64,
    pub lorentzian: f64,
}

/// Index of the momentum-grid point closest to `center`.
///
/// NaN distances never win the comparison, so detectors with partially
/// non-finite grids still anchor on a finite bin; an all-NaN grid falls back
/// to the first bin.
pub fn peak_anchor_index(yspace: &[f64], center: f64) -> usize {
    let mut best_index = 0;
    let mut best_distance = f64::INFINITY;
    for (index, &y) in yspace.iter().enumerate() {
        let distance = (y - center).abs();
        if distance < best_distance {
            best_distance = distance;
            best_index = index;
        }
    }
    best_index
}

/// Gaussian and Lorentzian resolution widths for one mass, linearised at the
/// anchored kinematic point.
pub fn resolution_widths(
    mass: f64,
    point: KinematicPoint,
    resolution: &ResolutionParamRow,
    instrument: &InstrumentParamRow,
) -> ResolutionWidths {
    let angle = instrument.scattering_angle.to_radians();
    let cos_theta = angle.cos();
    let sin_theta = angle.sin();
    let l1_over_l0 = instrument.l1 / instrument.l0;

    let e0 = point.e0;
    let energy_ratio = e0 / FINAL_ENERGY_MEV;

    // Energy-transfer partials, converted to momentum via (m / hbar^2 q)^2.
    let dw_de1 = 1.0 + energy_ratio.powf(1.5) * l1_over_l0;
    let dw_dtof = 2.0 * e0 * point.v0 / instrument.l0;
    let dw_dl1 = 2.0 * e0.powf(1.5) / FINAL_ENERGY_MEV.sqrt() / instrument.l0;
    let dw_dl0 = 2.0 * e0 / instrument.l0;

    let mut dw2 = (dw_de1 * resolution.de1).powi(2)
        + (dw_dtof * resolution.dtof).powi(2)
        + (dw_dl1 * resolution.dl1).powi(2)
        + (dw_dl0 * resolution.dl0).powi(2);
    dw2 *= (mass / (HBAR * HBAR) / point.delta_q).powi(2);

    // Momentum-transfer partials, converted via (mN / hbar^2 q)^2.
    let dq_de1 = 1.0
        - energy_ratio.powf(1.5) * l1_over_l0
        - cos_theta * (energy_ratio.sqrt() - l1_over_l0 * energy_ratio);
    let dq_dtof = 2.0 * e0 * point.v0 / instrument.l0;
    let dq_dl1 = 2.0 * e0.powf(1.5) / instrument.l0 / FINAL_ENERGY_MEV.sqrt();
    let dq_dl0 = 2.0 * e0 / instrument.l0;
    let dq_dtheta = 2.0 * (e0 * FINAL_ENERGY_MEV).sqrt() * sin_theta;

    let focusing = (FINAL_ENERGY_MEV / e0 * cos_theta - 1.0).abs();
    let mut dq2 = (dq_de1 * resolution.de1).powi(2)
        + ((dq_dtof * resolution.dtof).powi(2)
            + (dq_dl1 * resolution.dl1).powi(2)
            + (dq_dl0 * resolution.dl0).powi(2))
            * focusing
        + (dq_dtheta * resolution.dtheta).powi(2);
    dq2 *= (NEUTRON_MASS_AMU / (HBAR * HBAR) / point.delta_q).powi(2);

    let gaussian = (dw2 + dq2).sqrt();

    // Only the analyser energy spread carries a Lorentzian component.
    let dw_de1_lorentzian = (1.0 + energy_ratio.powf(1.5) * l1_over_l0).powi(2)
        * (mass / (HBAR * HBAR) / point.delta_q).powi(2);
    let dq_de1_lorentzian = (1.0
        - energy_ratio.powf(1.5) * l1_over_l0
        - cos_theta * (energy_ratio.sqrt() + l1_over_l0 * energy_ratio))
        .powi(2)
        * (NEUTRON_MASS_AMU / (HBAR * HBAR) / point.delta_q).powi(2);
    let lorentzian =
        (dw_de1_lorentzian + dq_de1_lorentzian).sqrt() * resolution.de1_lorentzian;

    ResolutionWidths {
        gaussian,
        lorentzian,
    }
}
