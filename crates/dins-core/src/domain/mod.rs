//! Core data model shared by every stage of the reduction pipeline.

pub mod errors;

pub use errors::{ReductionError, ReductionResult, SpectrumError};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One detector's time-of-flight histogram: `bin_edges` has one more entry
/// than the paired `values`/`errors` arrays and must be strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub bin_edges: Vec<f64>,
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

impl Spectrum {
    pub fn validate(&self) -> Result<(), SpectrumError> {
        if self.bin_edges.len() < 2 {
            return Err(SpectrumError::InsufficientBins {
                actual: self.bin_edges.len(),
            });
        }
        if self.values.len() + 1 != self.bin_edges.len()
            || self.errors.len() != self.values.len()
        {
            return Err(SpectrumError::LengthMismatch {
                edges: self.bin_edges.len(),
                values: self.values.len(),
                errors: self.errors.len(),
            });
        }
        for (index, window) in self.bin_edges.windows(2).enumerate() {
            if !(window[1] > window[0]) {
                return Err(SpectrumError::NonMonotonicEdges {
                    index: index + 1,
                    previous: window[0],
                    current: window[1],
                });
            }
        }
        Ok(())
    }

    /// Converts the histogram to point data: bin midpoints paired with
    /// per-bin densities. Every downstream array works on this layout.
    pub fn to_points(&self) -> PointData {
        let n = self.values.len();
        let mut x = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut errors = Vec::with_capacity(n);
        for i in 0..n {
            let width = self.bin_edges[i + 1] - self.bin_edges[i];
            x.push((self.bin_edges[i] + self.bin_edges[i + 1]) / 2.0);
            values.push(self.values[i] / width);
            errors.push(self.errors[i] / width);
        }
        PointData { x, values, errors }
    }
}

/// Point-data view of a spectrum: midpoints and per-bin densities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointData {
    pub x: Vec<f64>,
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

impl PointData {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Per-detector geometry row from the instrument parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParamRow {
    pub detector_number: u32,
    /// Scattering angle in degrees.
    pub scattering_angle: f64,
    /// Electronic delay, in microseconds.
    pub t0: f64,
    /// Incident flight path, in meters.
    pub l0: f64,
    /// Scattered flight path, in meters.
    pub l1: f64,
}

/// Fixed instrumental uncertainties propagated into the resolution widths.
/// Two regimes exist, selected by detector-number threshold (back- vs
/// forward-scattering geometry).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionParamRow {
    /// Incident-energy uncertainty, meV (standard deviation).
    pub de1: f64,
    /// Time-of-flight uncertainty, microseconds.
    pub dtof: f64,
    /// Scattering-angle uncertainty, radians.
    pub dtheta: f64,
    /// Incident flight-path uncertainty, meters.
    pub dl0: f64,
    /// Scattered flight-path uncertainty, meters.
    pub dl1: f64,
    /// Lorentzian incident-energy half-width, meV (HWHM).
    pub de1_lorentzian: f64,
}

/// Named trial parameters for one mass's Compton profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NcpParams {
    pub intensity: f64,
    pub width: f64,
    pub center: f64,
}

impl NcpParams {
    pub const FIELDS: usize = 3;

    pub fn nan() -> Self {
        Self {
            intensity: f64::NAN,
            width: f64::NAN,
            center: f64::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.intensity.is_nan() && self.width.is_nan() && self.center.is_nan()
    }
}

/// Flattens per-mass parameter records into the solver's parameter vector.
/// The layout is `[intensity, width, center]` per mass, in mass order.
pub fn pack_params(params: &[NcpParams]) -> Vec<f64> {
    let mut flat = Vec::with_capacity(params.len() * NcpParams::FIELDS);
    for p in params {
        flat.push(p.intensity);
        flat.push(p.width);
        flat.push(p.center);
    }
    flat
}

/// Rebuilds named per-mass records from a flat solver vector.
pub fn unpack_params(flat: &[f64]) -> Vec<NcpParams> {
    flat.chunks_exact(NcpParams::FIELDS)
        .map(|chunk| NcpParams {
            intensity: chunk[0],
            width: chunk[1],
            center: chunk[2],
        })
        .collect()
}

/// Flat-vector position of a mass's intensity parameter.
pub fn intensity_position(mass_index: usize) -> usize {
    mass_index * NcpParams::FIELDS
}

/// Best-fit outcome for one detector in one iteration.
///
/// A fully masked detector (all-zero spectrum) carries NaN in every numeric
/// field; the NaN propagates through the aggregate statistics so the detector
/// contributes nothing without special-case handling downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub detector_number: u32,
    pub params: Vec<NcpParams>,
    pub reduced_chi_square: f64,
    /// Solver iteration count; NaN for masked detectors, which keeps the
    /// sentinel uniform across every reported field.
    pub solver_iterations: f64,
}

impl FitResult {
    pub fn masked(detector_number: u32, mass_count: usize) -> Self {
        Self {
            detector_number,
            params: vec![NcpParams::nan(); mass_count],
            reduced_chi_square: f64::NAN,
            solver_iterations: f64::NAN,
        }
    }

    pub fn is_masked(&self) -> bool {
        self.params.iter().all(NcpParams::is_nan)
            && self.reduced_chi_square.is_nan()
            && self.solver_iterations.is_nan()
    }
}

/// Bidirectional map between non-contiguous detector numbers and dense array
/// indices. Built once at setup; never recomputed via offset arithmetic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectorMap {
    numbers: Vec<u32>,
    index_by_number: BTreeMap<u32, usize>,
}

impl DetectorMap {
    pub fn from_numbers(numbers: Vec<u32>) -> Self {
        let index_by_number = numbers
            .iter()
            .enumerate()
            .map(|(index, number)| (*number, index))
            .collect();
        Self {
            numbers,
            index_by_number,
        }
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn index_of(&self, detector_number: u32) -> Option<usize> {
        self.index_by_number.get(&detector_number).copied()
    }

    pub fn number_at(&self, index: usize) -> Option<u32> {
        self.numbers.get(index).copied()
    }

    pub fn numbers(&self) -> &[u32] {
        &self.numbers
    }
}
