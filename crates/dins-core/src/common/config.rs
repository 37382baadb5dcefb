//! Run configuration for the iterative reduction.
//!
//! Everything a run needs is declared here explicitly and validated once
//! before any fit starts; no component reads ambient state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::FORWARD_SCATTERING_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("first detector {first} is greater than last detector {last}")]
    InvertedDetectorRange { first: u32, last: u32 },
    #[error(
        "detector range {first}-{last} mixes back- and forward-scattering banks \
         (threshold {threshold})"
    )]
    MixedScatteringRange { first: u32, last: u32, threshold: u32 },
    #[error("masked detector {detector} is outside the range {first}-{last}")]
    MaskOutsideRange { detector: u32, first: u32, last: u32 },
    #[error("at least one fit iteration is required")]
    ZeroIterations,
    #[error("at least one mass model is required")]
    NoMasses,
    #[error("mass model {index} has non-positive atomic mass {mass}")]
    NonPositiveMass { index: usize, mass: f64 },
    #[error("mass model {index}: {parameter} bounds ({lower:?}, {upper:?}) are inverted")]
    InvertedBounds {
        index: usize,
        parameter: &'static str,
        lower: Option<f64>,
        upper: Option<f64>,
    },
    #[error("mass model {index}: initial {parameter} {value} violates its bounds")]
    InitialOutsideBounds {
        index: usize,
        parameter: &'static str,
        value: f64,
    },
    #[error(
        "intensity-ratio constraint references mass index {mass_index}, \
         but only {mass_count} masses are configured"
    )]
    ConstraintMassOutOfRange { mass_index: usize, mass_count: usize },
    #[error("intensity-ratio constraint {index} has non-finite ratio {ratio}")]
    NonFiniteRatio { index: usize, ratio: f64 },
}

/// Box bounds for one fit parameter; `None` leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ParamBounds {
    pub fn new(lower: impl Into<Option<f64>>, upper: impl Into<Option<f64>>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower.is_none_or(|lower| value >= lower)
            && self.upper.is_none_or(|upper| value <= upper)
    }

    fn is_inverted(&self) -> bool {
        matches!((self.lower, self.upper), (Some(lower), Some(upper)) if lower > upper)
    }
}

/// One chemical species in the sample: atomic mass, starting point and box
/// bounds for its profile parameters. Mass ordering is significant because
/// intensity-ratio constraints reference masses by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassModel {
    pub mass: f64,
    pub initial_intensity: f64,
    pub initial_width: f64,
    pub initial_center: f64,
    pub intensity_bounds: ParamBounds,
    pub width_bounds: ParamBounds,
    pub center_bounds: ParamBounds,
}

/// Stoichiometric equality constraint between two mass intensities:
/// `intensity[numerator] - ratio * intensity[denominator] == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityRatioConstraint {
    pub numerator_mass: usize,
    pub denominator_mass: usize,
    pub ratio: f64,
}

/// Immutable configuration of one reduction run, constructed once and passed
/// by reference into every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// First and last detector numbers of the analysed range (inclusive).
    pub first_detector: u32,
    pub last_detector: u32,
    /// Detector numbers forced to the masked (non-fitted) state.
    #[serde(default)]
    pub masked_detectors: Vec<u32>,
    /// Number of fit passes; the multiple-scattering correction runs between
    /// passes. At least one.
    pub iterations: usize,
    pub masses: Vec<MassModel>,
    #[serde(default)]
    pub constraints: Vec<IntensityRatioConstraint>,
    /// When set, each spectrum's values are rescaled to a fixed area of 100
    /// before fitting and the fitted intensities are rescaled back after.
    #[serde(default)]
    pub normalize_spectra: bool,
}

impl ReductionConfig {
    /// Fatal setup-time validation; must pass before any fit begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_detector > self.last_detector {
            return Err(ConfigError::InvertedDetectorRange {
                first: self.first_detector,
                last: self.last_detector,
            });
        }
        let first_is_back = self.first_detector < FORWARD_SCATTERING_THRESHOLD;
        let last_is_back = self.last_detector < FORWARD_SCATTERING_THRESHOLD;
        if first_is_back != last_is_back {
            return Err(ConfigError::MixedScatteringRange {
                first: self.first_detector,
                last: self.last_detector,
                threshold: FORWARD_SCATTERING_THRESHOLD,
            });
        }
        for &detector in &self.masked_detectors {
            if detector < self.first_detector || detector > self.last_detector {
                return Err(ConfigError::MaskOutsideRange {
                    detector,
                    first: self.first_detector,
                    last: self.last_detector,
                });
            }
        }
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.masses.is_empty() {
            return Err(ConfigError::NoMasses);
        }
        for (index, model) in self.masses.iter().enumerate() {
            if !(model.mass > 0.0) {
                return Err(ConfigError::NonPositiveMass {
                    index,
                    mass: model.mass,
                });
            }
            let parameters = [
                ("intensity", model.initial_intensity, model.intensity_bounds),
                ("width", model.initial_width, model.width_bounds),
                ("center", model.initial_center, model.center_bounds),
            ];
            for (name, initial, bounds) in parameters {
                if bounds.is_inverted() {
                    return Err(ConfigError::InvertedBounds {
                        index,
                        parameter: name,
                        lower: bounds.lower,
                        upper: bounds.upper,
                    });
                }
                if !bounds.contains(initial) {
                    return Err(ConfigError::InitialOutsideBounds {
                        index,
                        parameter: name,
                        value: initial,
                    });
                }
            }
        }
        for (index, constraint) in self.constraints.iter().enumerate() {
            for mass_index in [constraint.numerator_mass, constraint.denominator_mass] {
                if mass_index >= self.masses.len() {
                    return Err(ConfigError::ConstraintMassOutOfRange {
                        mass_index,
                        mass_count: self.masses.len(),
                    });
                }
            }
            if !constraint.ratio.is_finite() {
                return Err(ConfigError::NonFiniteRatio {
                    index,
                    ratio: constraint.ratio,
                });
            }
        }
        Ok(())
    }

    pub fn mass_values(&self) -> Vec<f64> {
        self.masses.iter().map(|model| model.mass).collect()
    }
}
