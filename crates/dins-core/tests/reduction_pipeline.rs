//! Controller-level behaviour: iteration bookkeeping, masking, background
//! subtraction wiring and resampling drivers.

use dins_core::domain::{InstrumentParamRow, NcpParams, ReductionError, Spectrum};
use dins_core::instrument::{InstrumentTable, resolution_for_detector};
use dins_core::profile::{DetectorSetup, synthesize};
use dins_core::reduction::{ReductionEngine, ScatteringSetup};
use dins_core::resample::{run_bootstrap, run_jackknife};
use dins_core::scattering::{
    MsCorrectionRequest, MultipleScatteringEstimator, NoCorrection, ScatteringError,
};
use dins_core::solver::AugmentedLagrangianSolver;
use dins_core::{MassModel, ParamBounds, ReductionConfig};

const FIRST_DETECTOR: u32 = 10;
const DETECTOR_COUNT: u32 = 4;

fn instrument_table() -> InstrumentTable {
    let rows = (0..DETECTOR_COUNT)
        .map(|i| InstrumentParamRow {
            detector_number: FIRST_DETECTOR + i,
            scattering_angle: 128.0 + 2.0 * i as f64,
            t0: 0.0,
            l0: 11.0,
            l1: 0.7,
        })
        .collect();
    InstrumentTable::from_rows(rows)
}

fn config(iterations: usize) -> ReductionConfig {
    ReductionConfig {
        first_detector: FIRST_DETECTOR,
        last_detector: FIRST_DETECTOR + DETECTOR_COUNT - 1,
        masked_detectors: vec![],
        iterations,
        masses: vec![MassModel {
            mass: 12.0,
            initial_intensity: 1.0,
            initial_width: 12.0,
            initial_center: 0.0,
            intensity_bounds: ParamBounds::new(0.0, None),
            width_bounds: ParamBounds::new(8.0, 16.0),
            center_bounds: ParamBounds::new(-30.0, 30.0),
        }],
        constraints: vec![],
        normalize_spectra: false,
    }
}

fn synthetic_spectrum(row: InstrumentParamRow, truth: NcpParams) -> Spectrum {
    let bin_edges: Vec<f64> = (0..=80).map(|i| 300.0 + i as f64).collect();
    let midpoints: Vec<f64> = bin_edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let setup = DetectorSetup::prepare(
        &midpoints,
        row,
        resolution_for_detector(row.detector_number),
        &[12.0],
    );
    let profiles = synthesize(&[truth], &[12.0], &setup);
    let n = profiles.total.len();
    Spectrum {
        bin_edges,
        values: profiles.total,
        errors: vec![0.0; n],
    }
}

fn synthetic_spectra(table: &InstrumentTable) -> Vec<Spectrum> {
    let truth = NcpParams {
        intensity: 1.2,
        width: 12.5,
        center: 0.0,
    };
    table
        .rows()
        .iter()
        .map(|&row| synthetic_spectrum(row, truth))
        .collect()
}

#[test]
fn zero_background_makes_every_iteration_identical() {
    let table = instrument_table();
    let spectra = synthetic_spectra(&table);
    let config = config(2);
    let solver = AugmentedLagrangianSolver::default();
    let scattering = NoCorrection;
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    let history = engine.run(&spectra).expect("reduction should run");
    assert_eq!(history.iterations.len(), 2);
    let first = &history.iterations[0];
    let second = &history.iterations[1];
    assert_eq!(first.detector_fits, second.detector_fits);
    assert_eq!(first.mean_widths, second.mean_widths);
    assert_eq!(first.total_profiles, second.total_profiles);
}

#[test]
fn masked_detector_yields_nan_sentinels_and_drops_out_of_the_means() {
    let table = instrument_table();
    let spectra = synthetic_spectra(&table);
    let mut config = config(1);
    config.masked_detectors = vec![FIRST_DETECTOR + 1];
    let solver = AugmentedLagrangianSolver::default();
    let scattering = NoCorrection;
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    let history = engine.run(&spectra).expect("reduction should run");
    let record = history.last();
    let masked = &record.detector_fits[1];
    assert!(masked.is_masked());
    assert_eq!(masked.detector_number, FIRST_DETECTOR + 1);
    // The remaining detectors carry the statistics.
    assert!((record.mean_widths[0] - 12.5).abs() < 0.1);
    assert!(record.mean_intensity_ratios[0].is_finite());
    // The masked detector's profile is NaN on every point.
    assert!(record.total_profiles[1].iter().all(|v| v.is_nan()));
}

#[test]
fn spectrum_count_must_match_the_detector_range() {
    let table = instrument_table();
    let mut spectra = synthetic_spectra(&table);
    spectra.pop();
    let config = config(1);
    let solver = AugmentedLagrangianSolver::default();
    let scattering = NoCorrection;
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    match engine.run(&spectra) {
        Err(ReductionError::DetectorCountMismatch {
            spectra: 3,
            detectors: 4,
        }) => {}
        other => panic!("expected a detector count mismatch, got {other:?}"),
    }
}

/// Estimator returning a constant offset, to prove the subtraction always
/// starts from the original spectra rather than compounding.
struct ConstantBackground(f64);

impl MultipleScatteringEstimator for ConstantBackground {
    fn estimate_background(
        &self,
        request: &MsCorrectionRequest<'_>,
    ) -> Result<Vec<Vec<f64>>, ScatteringError> {
        Ok(vec![vec![self.0; request.x.len()]; request.measured.len()])
    }
}

#[test]
fn background_is_subtracted_from_the_original_spectra_each_iteration() {
    let table = instrument_table();
    let spectra = synthetic_spectra(&table);
    let config = config(3);
    let solver = AugmentedLagrangianSolver::default();
    let scattering = ConstantBackground(1.0e-6);
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    let history = engine.run(&spectra).expect("reduction should run");
    assert_eq!(history.iterations.len(), 3);
    // A compounding subtraction would drift iteration 3 away from 2; the
    // original-anchored subtraction makes them identical.
    let second = &history.iterations[1];
    let third = &history.iterations[2];
    assert_eq!(second.detector_fits, third.detector_fits);
}

#[test]
fn masked_detector_stays_masked_once_a_background_is_subtracted() {
    let table = instrument_table();
    let spectra = synthetic_spectra(&table);
    let mut config = config(2);
    config.masked_detectors = vec![FIRST_DETECTOR + 1];
    let solver = AugmentedLagrangianSolver::default();
    // A nonzero offset must not revive the zeroed row on the second pass.
    let scattering = ConstantBackground(1.0e-4);
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    let history = engine.run(&spectra).expect("reduction should run");
    assert_eq!(history.iterations.len(), 2);
    for record in &history.iterations {
        assert!(record.detector_fits[1].is_masked());
        assert!((record.mean_widths[0] - 12.5).abs() < 0.1);
    }
}

#[test]
fn ragged_spectra_are_rejected_before_fitting() {
    let table = instrument_table();
    let mut spectra = synthetic_spectra(&table);
    spectra[2].bin_edges.truncate(61);
    spectra[2].values.truncate(60);
    spectra[2].errors.truncate(60);
    let config = config(1);
    let solver = AugmentedLagrangianSolver::default();
    let scattering = NoCorrection;
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    match engine.run(&spectra) {
        Err(ReductionError::RaggedSpectra {
            expected: 80,
            detector_index: 2,
            actual: 60,
        }) => {}
        other => panic!("expected a ragged-spectra error, got {other:?}"),
    }
}

#[test]
fn bootstrap_replicas_of_noise_free_data_reproduce_the_parent() {
    let table = instrument_table();
    let spectra = synthetic_spectra(&table);
    let points: Vec<_> = spectra.iter().map(Spectrum::to_points).collect();
    let config = config(1);
    let solver = AugmentedLagrangianSolver::default();
    let scattering = NoCorrection;
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    let histories = run_bootstrap(&engine, &points, 2, 42).expect("bootstrap should run");
    assert_eq!(histories.len(), 3);
    // Residuals of a perfect fit are ~0, so every replica refits the same
    // data up to solver tolerance.
    let parent_widths = &histories[0].last().mean_widths;
    for replica in &histories[1..] {
        let widths = &replica.last().mean_widths;
        assert!((widths[0] - parent_widths[0]).abs() < 1.0e-3);
    }
}

#[test]
fn jackknife_produces_one_history_per_data_column() {
    let table = instrument_table();
    let spectra = synthetic_spectra(&table);
    let points: Vec<_> = spectra.iter().map(Spectrum::to_points).collect();
    let columns = points[0].len();
    let config = config(1);
    let solver = AugmentedLagrangianSolver::default();
    let scattering = NoCorrection;
    let engine = ReductionEngine::new(
        &config,
        &table,
        &solver,
        &scattering,
        ScatteringSetup::default(),
    )
    .expect("configuration is valid");

    let histories = run_jackknife(&engine, &points).expect("jackknife should run");
    assert_eq!(histories.len(), columns);
    for history in &histories {
        assert_eq!(history.iterations.len(), 1);
        assert!(history.last().mean_widths[0].is_finite());
    }
}
