//! Iterative reduction controller.
//!
//! Each iteration fits every detector independently, aggregates the fitted
//! widths and intensity ratios across detectors and, except after the last
//! iteration, subtracts a freshly simulated multiple-scattering background
//! from the ORIGINAL spectra before fitting again. The background is never
//! subtracted from already-corrected data.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::config::ReductionConfig;
use crate::domain::{
    DetectorMap, FitResult, PointData, ReductionError, ReductionResult, Spectrum,
};
use crate::fitter::{FitModel, fit_spectrum, fitted_profiles};
use crate::instrument::{InstrumentTable, resolution_for_detector};
use crate::numerics::stats::{nan_mean, nan_std};
use crate::profile::DetectorSetup;
use crate::scattering::{
    BeamParameters, MsCorrectionRequest, MsSettings, MultipleScatteringEstimator, SlabGeometry,
    sample_properties,
};
use crate::solver::ConstrainedMinimizer;

/// Sample and simulation description handed to the scattering estimator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScatteringSetup {
    pub geometry: SlabGeometry,
    pub beam: BeamParameters,
    pub settings: MsSettings,
}

/// Everything recorded about one iteration of the reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Aggregated profile width per mass.
    pub mean_widths: Vec<f64>,
    /// Aggregated relative intensity per mass; the ratios sum to one over the
    /// masses (NaN rows excluded).
    pub mean_intensity_ratios: Vec<f64>,
    pub detector_fits: Vec<FitResult>,
    /// Summed fitted profile per detector, on that detector's grid.
    pub total_profiles: Vec<Vec<f64>>,
    /// Fitted profile per detector and per mass.
    pub mass_profiles: Vec<Vec<Vec<f64>>>,
}

/// Record of a full reduction: one entry per iteration, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionHistory {
    pub iterations: Vec<IterationRecord>,
}

impl ReductionHistory {
    /// The converged record; reductions always run at least one iteration.
    pub fn last(&self) -> &IterationRecord {
        &self.iterations[self.iterations.len() - 1]
    }
}

/// Drives the fit-aggregate-correct loop over one detector bank.
pub struct ReductionEngine<'a> {
    config: &'a ReductionConfig,
    rows: InstrumentTable,
    detector_map: DetectorMap,
    model: FitModel,
    minimizer: &'a dyn ConstrainedMinimizer,
    scattering: &'a dyn MultipleScatteringEstimator,
    scattering_setup: ScatteringSetup,
}

impl<'a> ReductionEngine<'a> {
    pub fn new(
        config: &'a ReductionConfig,
        table: &InstrumentTable,
        minimizer: &'a dyn ConstrainedMinimizer,
        scattering: &'a dyn MultipleScatteringEstimator,
        scattering_setup: ScatteringSetup,
    ) -> ReductionResult<Self> {
        config.validate()?;
        let rows = table.select_range(config.first_detector, config.last_detector);
        let detector_map = rows.detector_map();
        let model = FitModel::from_config(config);
        Ok(Self {
            config,
            rows,
            detector_map,
            model,
            minimizer,
            scattering,
            scattering_setup,
        })
    }

    pub fn detector_map(&self) -> &DetectorMap {
        &self.detector_map
    }

    pub fn model(&self) -> &FitModel {
        &self.model
    }

    /// Runs the reduction on raw histograms, one per detector of the selected
    /// range, in table order.
    pub fn run(&self, spectra: &[Spectrum]) -> ReductionResult<ReductionHistory> {
        for spectrum in spectra {
            spectrum.validate()?;
        }
        let points: Vec<PointData> = spectra.iter().map(Spectrum::to_points).collect();
        self.run_on_points(&points)
    }

    /// Runs the reduction on pre-converted point data.
    pub fn run_on_points(&self, points: &[PointData]) -> ReductionResult<ReductionHistory> {
        if points.len() != self.rows.len() {
            return Err(ReductionError::DetectorCountMismatch {
                spectra: points.len(),
                detectors: self.rows.len(),
            });
        }
        // The multiple-scattering background is simulated on one shared grid,
        // so every detector must carry the same number of points.
        if let Some(first) = points.first() {
            for (index, data) in points.iter().enumerate() {
                if data.len() != first.len() {
                    return Err(ReductionError::RaggedSpectra {
                        expected: first.len(),
                        detector_index: index,
                        actual: data.len(),
                    });
                }
            }
        }

        let setups: Vec<DetectorSetup> = self
            .rows
            .rows()
            .iter()
            .zip(points)
            .map(|(&row, data)| {
                DetectorSetup::prepare(
                    &data.x,
                    row,
                    resolution_for_detector(row.detector_number),
                    self.model.masses(),
                )
            })
            .collect();

        // Masked detectors are zeroed in place; the all-zero state drives the
        // NaN-sentinel path in the fitter.
        let mut errors: Vec<Vec<f64>> = points.iter().map(|d| d.errors.clone()).collect();
        let original: Vec<Vec<f64>> = points
            .iter()
            .enumerate()
            .map(|(index, data)| {
                if self.is_masked(index) {
                    errors[index] = vec![0.0; data.values.len()];
                    vec![0.0; data.values.len()]
                } else {
                    data.values.clone()
                }
            })
            .collect();
        let mut current = original.clone();

        let iterations = self.config.iterations;
        let mut history = ReductionHistory {
            iterations: Vec::with_capacity(iterations),
        };

        for iteration in 0..iterations {
            let fits = self.fit_all(&current, &errors, &setups)?;
            let (mean_widths, mean_intensity_ratios) = mean_widths_and_intensities(
                &fits,
                self.model.mass_count(),
            );

            let mut total_profiles = Vec::with_capacity(fits.len());
            let mut mass_profiles = Vec::with_capacity(fits.len());
            for (fit, setup) in fits.iter().zip(&setups) {
                let profiles = fitted_profiles(fit, &self.model, setup);
                total_profiles.push(profiles.total);
                mass_profiles.push(profiles.per_mass);
            }

            let is_last = iteration + 1 == iterations;
            if !is_last {
                let grid = points.first().map_or(&[] as &[f64], |d| d.x.as_slice());
                let background =
                    self.estimate_background(grid, &original, &mean_widths, &mean_intensity_ratios)?;
                for (index, ((corrected, measured), background_row)) in
                    current.iter_mut().zip(&original).zip(&background).enumerate()
                {
                    // Masked rows stay all-zero; subtracting the simulated
                    // background would hand the fitter a nonzero spectrum.
                    if self.is_masked(index) {
                        continue;
                    }
                    for i in 0..corrected.len() {
                        corrected[i] = measured[i] - background_row[i];
                    }
                }
            }

            history.iterations.push(IterationRecord {
                mean_widths,
                mean_intensity_ratios,
                detector_fits: fits,
                total_profiles,
                mass_profiles,
            });
        }

        Ok(history)
    }

    fn is_masked(&self, index: usize) -> bool {
        self.detector_map
            .number_at(index)
            .is_some_and(|number| self.config.masked_detectors.contains(&number))
    }

    fn fit_all(
        &self,
        values: &[Vec<f64>],
        errors: &[Vec<f64>],
        setups: &[DetectorSetup],
    ) -> ReductionResult<Vec<FitResult>> {
        let normalize = self.config.normalize_spectra;
        let fits: Result<Vec<FitResult>, _> = values
            .par_iter()
            .zip(errors.par_iter())
            .zip(setups.par_iter())
            .map(|((detector_values, detector_errors), setup)| {
                let scale = if normalize {
                    let sum: f64 = detector_values.iter().sum();
                    if sum != 0.0 { 100.0 / sum } else { 1.0 }
                } else {
                    1.0
                };
                if scale == 1.0 {
                    return fit_spectrum(
                        detector_values,
                        detector_errors,
                        setup,
                        &self.model,
                        self.minimizer,
                    );
                }
                let scaled: Vec<f64> = detector_values.iter().map(|v| v * scale).collect();
                let mut fit = fit_spectrum(
                    &scaled,
                    detector_errors,
                    setup,
                    &self.model,
                    self.minimizer,
                )?;
                // Fitted intensities are reported in the original units.
                for p in &mut fit.params {
                    p.intensity /= scale;
                }
                Ok(fit)
            })
            .collect();
        fits.map_err(ReductionError::Solver)
    }

    /// Simulates the background on the bank's nominal grid (the first
    /// detector's midpoints stand in for every row).
    fn estimate_background(
        &self,
        x: &[f64],
        original: &[Vec<f64>],
        mean_widths: &[f64],
        mean_intensity_ratios: &[f64],
    ) -> ReductionResult<Vec<Vec<f64>>> {
        let species = sample_properties(
            self.model.masses(),
            mean_widths,
            mean_intensity_ratios,
            &self.scattering_setup.settings,
        )?;
        let request = MsCorrectionRequest {
            x,
            measured: original,
            species: &species,
            geometry: self.scattering_setup.geometry,
            beam: self.scattering_setup.beam,
            settings: self.scattering_setup.settings,
        };
        let background = self.scattering.estimate_background(&request)?;

        let points = original.first().map_or(0, Vec::len);
        let bad_row = background
            .iter()
            .position(|row_values| row_values.len() != points);
        if background.len() != original.len() || bad_row.is_some() {
            return Err(ReductionError::BackgroundShapeMismatch {
                detectors: original.len(),
                points,
                actual_rows: background.len(),
                bad_row,
            });
        }
        Ok(background)
    }
}

/// Cross-detector aggregation with one-pass outlier rejection.
///
/// First-pass mean and standard deviation of the widths define the exclusion
/// band per mass; detectors whose width deviates by more than one standard
/// deviation are dropped from both statistics. Intensities are renormalised
/// per detector with a plain sum, so a NaN for any mass poisons that
/// detector's whole intensity column.
pub fn mean_widths_and_intensities(
    fits: &[FitResult],
    mass_count: usize,
) -> (Vec<f64>, Vec<f64>) {
    let detector_count = fits.len();
    let mut widths = vec![vec![f64::NAN; detector_count]; mass_count];
    let mut intensities = vec![vec![f64::NAN; detector_count]; mass_count];
    for (d, fit) in fits.iter().enumerate() {
        for (m, p) in fit.params.iter().enumerate() {
            widths[m][d] = p.width;
            intensities[m][d] = p.intensity;
        }
    }

    for m in 0..mass_count {
        let mean = nan_mean(&widths[m]);
        let std = nan_std(&widths[m]);
        for d in 0..detector_count {
            if (widths[m][d] - mean).abs() > std {
                widths[m][d] = f64::NAN;
                intensities[m][d] = f64::NAN;
            }
        }
    }

    let mean_widths: Vec<f64> = widths.iter().map(|row| nan_mean(row)).collect();

    for d in 0..detector_count {
        let total: f64 = (0..mass_count).map(|m| intensities[m][d]).sum();
        for m in 0..mass_count {
            intensities[m][d] /= total;
        }
    }
    let mean_intensity_ratios: Vec<f64> =
        intensities.iter().map(|row| nan_mean(row)).collect();

    (mean_widths, mean_intensity_ratios)
}

#[cfg(test)]
mod tests {
    use super::mean_widths_and_intensities;
    use crate::domain::{FitResult, NcpParams};

    fn fit(detector_number: u32, params: &[(f64, f64)]) -> FitResult {
        FitResult {
            detector_number,
            params: params
                .iter()
                .map(|&(intensity, width)| NcpParams {
                    intensity,
                    width,
                    center: 0.0,
                })
                .collect(),
            reduced_chi_square: 1.0,
            solver_iterations: 10.0,
        }
    }

    #[test]
    fn outlier_width_is_excluded_from_both_statistics() {
        let fits = vec![
            fit(1, &[(1.0, 5.0)]),
            fit(2, &[(1.0, 5.0)]),
            fit(3, &[(1.0, 5.0)]),
            fit(4, &[(1.0, 50.0)]),
        ];
        let (mean_widths, mean_ratios) = mean_widths_and_intensities(&fits, 1);
        // First-pass stats: mean 16.25, std ~19.49; only the 50 deviates by
        // more than one std.
        assert!((mean_widths[0] - 5.0).abs() < 1.0e-12);
        assert!((mean_ratios[0] - 1.0).abs() < 1.0e-12);
    }

    #[test]
    fn masked_detectors_drop_out_of_the_means() {
        let mut fits = vec![
            fit(1, &[(0.6, 10.0), (0.4, 14.0)]),
            fit(2, &[(0.6, 10.0), (0.4, 14.0)]),
        ];
        fits.push(FitResult::masked(3, 2));
        let (mean_widths, mean_ratios) = mean_widths_and_intensities(&fits, 2);
        assert!((mean_widths[0] - 10.0).abs() < 1.0e-12);
        assert!((mean_widths[1] - 14.0).abs() < 1.0e-12);
        assert!((mean_ratios[0] - 0.6).abs() < 1.0e-12);
        assert!((mean_ratios[1] - 0.4).abs() < 1.0e-12);
    }

    #[test]
    fn intensity_ratios_are_renormalised_per_detector() {
        let fits = vec![
            fit(1, &[(2.0, 10.0), (6.0, 14.0)]),
            fit(2, &[(1.0, 10.0), (3.0, 14.0)]),
        ];
        let (_, mean_ratios) = mean_widths_and_intensities(&fits, 2);
        assert!((mean_ratios[0] - 0.25).abs() < 1.0e-12);
        assert!((mean_ratios[1] - 0.75).abs() < 1.0e-12);
    }

    #[test]
    fn nan_in_one_mass_poisons_that_detectors_intensity_column() {
        let mut degenerate = fit(2, &[(1.0, 10.0), (3.0, 14.0)]);
        degenerate.params[0] = NcpParams::nan();
        let fits = vec![fit(1, &[(2.0, 10.0), (6.0, 14.0)]), degenerate];
        let (_, mean_ratios) = mean_widths_and_intensities(&fits, 2);
        // Detector 2 contributes nothing to either mass's ratio.
        assert!((mean_ratios[0] - 0.25).abs() < 1.0e-12);
        assert!((mean_ratios[1] - 0.75).abs() < 1.0e-12);
    }
}
