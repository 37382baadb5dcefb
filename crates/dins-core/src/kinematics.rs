//! Time-of-flight kinematics for an inverse-geometry spectrometer.
//!
//! The analyser fixes the final energy; incident energy, energy transfer and
//! momentum transfer follow from the flight times and the detector geometry.
//! No validity checks happen here: a flight time at or below the frame origin
//! produces non-finite values that propagate through the fit.

use serde::{Deserialize, Serialize};

use crate::common::constants::{
    ENERGY_TO_VELOCITY, FINAL_ENERGY_MEV, HBAR, NEUTRON_MASS_AMU, final_velocity,
};
use crate::domain::InstrumentParamRow;

/// Per-bin kinematic quantities for one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicArrays {
    /// Incident velocity.
    pub v0: Vec<f64>,
    /// Incident energy in meV.
    pub e0: Vec<f64>,
    /// Energy transfer in meV.
    pub delta_e: Vec<f64>,
    /// Momentum transfer in inverse Angstrom.
    pub delta_q: Vec<f64>,
}

/// Kinematics of a single time bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicPoint {
    pub v0: f64,
    pub e0: f64,
    pub delta_e: f64,
    pub delta_q: f64,
}

impl KinematicArrays {
    pub fn len(&self) -> usize {
        self.e0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.e0.is_empty()
    }

    pub fn point(&self, index: usize) -> KinematicPoint {
        KinematicPoint {
            v0: self.v0[index],
            e0: self.e0[index],
            delta_e: self.delta_e[index],
            delta_q: self.delta_q[index],
        }
    }
}

/// Kinematic arrays for one detector over a TOF grid in microseconds.
pub fn compute_kinematics(tof: &[f64], row: &InstrumentParamRow) -> KinematicArrays {
    let vf = final_velocity();
    let cos_theta = row.scattering_angle.to_radians().cos();

    let mut v0 = Vec::with_capacity(tof.len());
    let mut e0 = Vec::with_capacity(tof.len());
    let mut delta_e = Vec::with_capacity(tof.len());
    let mut delta_q = Vec::with_capacity(tof.len());

    for &t in tof {
        let flight_time = t - row.t0;
        let velocity = vf * row.l0 / (vf * flight_time - row.l1);
        let energy = (velocity / ENERGY_TO_VELOCITY).powi(2);
        let momentum2 = 2.0 * NEUTRON_MASS_AMU / (HBAR * HBAR)
            * (energy + FINAL_ENERGY_MEV
                - 2.0 * (energy * FINAL_ENERGY_MEV).sqrt() * cos_theta);

        v0.push(velocity);
        e0.push(energy);
        delta_e.push(energy - FINAL_ENERGY_MEV);
        delta_q.push(momentum2.sqrt());
    }

    KinematicArrays {
        v0,
        e0,
        delta_e,
        delta_q,
    }
}

/// West scaling: projects energy and momentum transfer onto the momentum
/// coordinate of a nucleus of the given mass.
pub fn y_transform(mass: f64, kinematics: &KinematicArrays) -> Vec<f64> {
    kinematics
        .delta_e
        .iter()
        .zip(&kinematics.delta_q)
        .map(|(&de, &dq)| mass / (HBAR * HBAR) / dq * (de - HBAR * HBAR * dq * dq / 2.0 / mass))
        .collect()
}
