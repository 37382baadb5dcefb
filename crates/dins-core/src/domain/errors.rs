use thiserror::Error;

use crate::common::config::ConfigError;
use crate::instrument::parser::TableError;
use crate::scattering::ScatteringError;
use crate::solver::SolverError;

/// Shape errors raised when a raw spectrum violates its histogram invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("spectrum requires at least 2 bin edges, got {actual}")]
    InsufficientBins { actual: usize },
    #[error(
        "spectrum value/error arrays must have one entry per bin: \
         {edges} edges, {values} values, {errors} errors"
    )]
    LengthMismatch {
        edges: usize,
        values: usize,
        errors: usize,
    },
    #[error(
        "spectrum bin edges must be strictly increasing, index {index} has {current} after {previous}"
    )]
    NonMonotonicEdges {
        index: usize,
        previous: f64,
        current: f64,
    },
}

/// Top-level error for a reduction run.
///
/// Degenerate detectors and optimizer non-convergence are *not* errors; they
/// surface through NaN sentinels and reported iteration counts instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReductionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Scattering(#[from] ScatteringError),
    #[error(
        "spectrum count does not match the selected detector range: \
         {spectra} spectra for {detectors} detectors"
    )]
    DetectorCountMismatch { spectra: usize, detectors: usize },
    #[error(
        "all spectra must share one grid length: detector index {detector_index} has \
         {actual} points, expected {expected}"
    )]
    RaggedSpectra {
        expected: usize,
        detector_index: usize,
        actual: usize,
    },
    #[error(
        "multiple-scattering background shape mismatch: expected {detectors} rows of {points} points, \
         got {actual_rows} rows (first bad row {bad_row:?})"
    )]
    BackgroundShapeMismatch {
        detectors: usize,
        points: usize,
        actual_rows: usize,
        bad_row: Option<usize>,
    },
}

pub type ReductionResult<T> = Result<T, ReductionError>;
