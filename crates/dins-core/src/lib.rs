//! Deep-inelastic neutron scattering reduction.
//!
//! Fits neutron Compton profiles to time-of-flight spectra on an
//! inverse-geometry spectrometer and iterates the fit against a simulated
//! multiple-scattering background. The pipeline per iteration:
//!
//! 1. kinematics and West scaling per detector ([`kinematics`]),
//! 2. resolution widths anchored at each mass's peak ([`resolution`]),
//! 3. profile synthesis with final-state correction ([`profile`]),
//! 4. constrained least squares per detector ([`fitter`], [`solver`]),
//! 5. cross-detector aggregation and background subtraction ([`reduction`]).
//!
//! [`resample`] wraps the whole pipeline in bootstrap/jackknife replicas and
//! [`yspace`] prepares the lightest mass for y-space analysis.

pub mod common;
pub mod domain;
pub mod fitter;
pub mod instrument;
pub mod kinematics;
pub mod numerics;
pub mod profile;
pub mod reduction;
pub mod resample;
pub mod resolution;
pub mod scattering;
pub mod solver;
pub mod yspace;

pub use common::config::{
    ConfigError, IntensityRatioConstraint, MassModel, ParamBounds, ReductionConfig,
};
pub use domain::{
    FitResult, NcpParams, PointData, ReductionError, ReductionResult, Spectrum, SpectrumError,
};
pub use instrument::InstrumentTable;
pub use reduction::{IterationRecord, ReductionEngine, ReductionHistory, ScatteringSetup};
pub use scattering::{
    MsSettings, MultipleScatteringEstimator, NoCorrection, ScatteringError, SlabGeometry,
};
pub use solver::{AugmentedLagrangianSolver, ConstrainedMinimizer, SolverError, SolverOptions};
