//! Multiple-scattering correction seam.
//!
//! The simulation itself (ray tracing through the sample slab) lives behind
//! [`MultipleScatteringEstimator`]; the reduction only needs the simulated
//! background matrix and the sample properties assembled here from the
//! converged fit statistics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScatteringError {
    #[error("multiple-scattering simulation failed: {reason}")]
    SimulationFailed { reason: String },
    #[error("sample properties need at least one mass")]
    EmptySampleProperties,
}

/// Sample slab dimensions in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlabGeometry {
    pub vertical_width: f64,
    pub horizontal_width: f64,
    pub thickness: f64,
}

impl Default for SlabGeometry {
    fn default() -> Self {
        Self {
            vertical_width: 0.1,
            horizontal_width: 0.1,
            thickness: 0.001,
        }
    }
}

/// Incident beam description for the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamParameters {
    /// Beam radius in centimeters.
    pub radius: f64,
}

impl Default for BeamParameters {
    fn default() -> Self {
        Self { radius: 2.5 }
    }
}

/// Adds a hydrogen species to the simulated sample, proportional to the
/// fitted intensity of the first configured mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HydrogenConstraint {
    pub intensity_ratio_to_first_mass: f64,
}

/// Knobs of the multiple-scattering simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MsSettings {
    pub transmission_guess: f64,
    pub scattering_order: u32,
    pub event_count: u64,
    #[serde(default)]
    pub hydrogen: Option<HydrogenConstraint>,
}

impl Default for MsSettings {
    fn default() -> Self {
        Self {
            transmission_guess: 0.98,
            scattering_order: 2,
            event_count: 100_000,
            hydrogen: None,
        }
    }
}

/// One species of the simulated sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSpecies {
    pub mass: f64,
    pub intensity: f64,
    pub width: f64,
}

const HYDROGEN_MASS_AMU: f64 = 1.0079;
const HYDROGEN_DEFAULT_WIDTH: f64 = 5.0;

/// Assembles the per-species sample description from the converged mean
/// widths and intensity ratios.
///
/// When a hydrogen constraint is configured, a hydrogen species is appended
/// with intensity proportional to the first mass and the intensities are
/// renormalised to unit sum.
pub fn sample_properties(
    masses: &[f64],
    mean_widths: &[f64],
    mean_intensity_ratios: &[f64],
    settings: &MsSettings,
) -> Result<Vec<SampleSpecies>, ScatteringError> {
    if masses.is_empty() {
        return Err(ScatteringError::EmptySampleProperties);
    }
    let mut species: Vec<SampleSpecies> = masses
        .iter()
        .zip(mean_widths)
        .zip(mean_intensity_ratios)
        .map(|((&mass, &width), &intensity)| SampleSpecies {
            mass,
            intensity,
            width,
        })
        .collect();

    if let Some(hydrogen) = settings.hydrogen {
        species.push(SampleSpecies {
            mass: HYDROGEN_MASS_AMU,
            intensity: hydrogen.intensity_ratio_to_first_mass * species[0].intensity,
            width: HYDROGEN_DEFAULT_WIDTH,
        });
        let total: f64 = species.iter().map(|s| s.intensity).sum();
        for s in &mut species {
            s.intensity /= total;
        }
    }
    Ok(species)
}

/// Everything the simulation needs for one correction pass: the original
/// measured matrix, the grid, the geometry and the converged sample.
pub struct MsCorrectionRequest<'a> {
    pub x: &'a [f64],
    pub measured: &'a [Vec<f64>],
    pub species: &'a [SampleSpecies],
    pub geometry: SlabGeometry,
    pub beam: BeamParameters,
    pub settings: MsSettings,
}

/// Produces the per-detector multiple-scattering background, one row per
/// measured spectrum, on the same grid as `request.x`.
pub trait MultipleScatteringEstimator: Sync {
    fn estimate_background(
        &self,
        request: &MsCorrectionRequest<'_>,
    ) -> Result<Vec<Vec<f64>>, ScatteringError>;
}

/// Null estimator: an all-zero background, leaving the spectra untouched
/// between iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrection;

impl MultipleScatteringEstimator for NoCorrection {
    fn estimate_background(
        &self,
        request: &MsCorrectionRequest<'_>,
    ) -> Result<Vec<Vec<f64>>, ScatteringError> {
        Ok(vec![vec![0.0; request.x.len()]; request.measured.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BeamParameters, HydrogenConstraint, MsCorrectionRequest, MsSettings,
        MultipleScatteringEstimator, NoCorrection, SlabGeometry, sample_properties,
    };

    #[test]
    fn properties_pair_masses_with_their_statistics() {
        let species = sample_properties(
            &[140.1, 195.1],
            &[18.0, 22.0],
            &[0.06, 0.94],
            &MsSettings::default(),
        )
        .expect("two masses are valid");
        assert_eq!(species.len(), 2);
        assert_eq!(species[0].mass, 140.1);
        assert_eq!(species[0].width, 18.0);
        assert_eq!(species[1].intensity, 0.94);
    }

    #[test]
    fn hydrogen_augmentation_appends_and_renormalises() {
        let settings = MsSettings {
            hydrogen: Some(HydrogenConstraint {
                intensity_ratio_to_first_mass: 38.5,
            }),
            ..MsSettings::default()
        };
        let species = sample_properties(&[16.0, 27.0], &[10.0, 13.0], &[0.2, 0.8], &settings)
            .expect("valid input");
        assert_eq!(species.len(), 3);
        assert_eq!(species[2].mass, 1.0079);
        assert_eq!(species[2].width, 5.0);
        let total: f64 = species.iter().map(|s| s.intensity).sum();
        assert!((total - 1.0).abs() < 1.0e-12);
        // H intensity was 38.5 * 0.2 before renormalisation.
        let expected = 38.5 * 0.2 / (0.2 + 0.8 + 38.5 * 0.2);
        assert!((species[2].intensity - expected).abs() < 1.0e-12);
    }

    #[test]
    fn empty_mass_list_is_rejected() {
        assert!(sample_properties(&[], &[], &[], &MsSettings::default()).is_err());
    }

    #[test]
    fn null_estimator_returns_a_zero_matrix_of_matching_shape() {
        let x = vec![1.0, 2.0, 3.0];
        let measured = vec![vec![0.5; 3]; 4];
        let species = sample_properties(&[12.0], &[12.0], &[1.0], &MsSettings::default())
            .expect("valid input");
        let request = MsCorrectionRequest {
            x: &x,
            measured: &measured,
            species: &species,
            geometry: SlabGeometry::default(),
            beam: BeamParameters::default(),
            settings: MsSettings::default(),
        };
        let background = NoCorrection
            .estimate_background(&request)
            .expect("null estimator cannot fail");
        assert_eq!(background.len(), 4);
        assert!(background.iter().all(|row| row.iter().all(|&v| v == 0.0)));
    }
}
