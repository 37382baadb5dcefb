//! Instrument parameter table handling: parsing, detector-range selection,
//! detector-number↔index mapping and the fixed resolution regimes.

pub mod parser;

pub use parser::{TableError, parse_instrument_table};

use crate::common::constants::FORWARD_SCATTERING_THRESHOLD;
use crate::domain::{DetectorMap, InstrumentParamRow, ResolutionParamRow};

/// Fixed uncertainties of the back-scattering bank (double-difference mode).
pub const BACK_SCATTERING_RESOLUTION: ResolutionParamRow = ResolutionParamRow {
    de1: 88.7,
    dtof: 0.37,
    dtheta: 0.016,
    dl0: 0.021,
    dl1: 0.023,
    de1_lorentzian: 40.3,
};

/// Fixed uncertainties of the forward-scattering bank (single-difference mode).
pub const FORWARD_SCATTERING_RESOLUTION: ResolutionParamRow = ResolutionParamRow {
    de1: 73.0,
    dtof: 0.37,
    dtheta: 0.016,
    dl0: 0.021,
    dl1: 0.023,
    de1_lorentzian: 24.0,
};

/// Selects the resolution regime for one detector by number threshold.
pub fn resolution_for_detector(detector_number: u32) -> ResolutionParamRow {
    if detector_number < FORWARD_SCATTERING_THRESHOLD {
        BACK_SCATTERING_RESOLUTION
    } else {
        FORWARD_SCATTERING_RESOLUTION
    }
}

/// Instrument parameter rows filtered to one contiguous detector-number range.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentTable {
    rows: Vec<InstrumentParamRow>,
}

impl InstrumentTable {
    pub fn parse(source: &str) -> Result<Self, TableError> {
        Ok(Self {
            rows: parse_instrument_table(source)?,
        })
    }

    pub fn from_rows(rows: Vec<InstrumentParamRow>) -> Self {
        Self { rows }
    }

    /// Keeps only detectors with `first <= number <= last`, preserving order.
    pub fn select_range(&self, first: u32, last: u32) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .filter(|row| row.detector_number >= first && row.detector_number <= last)
                .copied()
                .collect(),
        }
    }

    pub fn rows(&self) -> &[InstrumentParamRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Builds the detector-number↔dense-index map for the selected rows.
    pub fn detector_map(&self) -> DetectorMap {
        DetectorMap::from_numbers(self.rows.iter().map(|row| row.detector_number).collect())
    }

    /// Per-row resolution regime, keyed by detector number.
    pub fn resolution_rows(&self) -> Vec<ResolutionParamRow> {
        self.rows
            .iter()
            .map(|row| resolution_for_detector(row.detector_number))
            .collect()
    }
}
