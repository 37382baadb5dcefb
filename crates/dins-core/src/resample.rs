//! Uncertainty estimation by whole-pipeline resampling.
//!
//! Bootstrap replicas rebuild each spectrum as fitted profile plus residuals
//! drawn with replacement from that spectrum's own residuals; jackknife
//! replicas delete one data column at a time. Every replica goes through the
//! full reduction, so the spread of the replica results carries the complete
//! nonlinearity of the fit.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::{PointData, ReductionResult};
use crate::reduction::{ReductionEngine, ReductionHistory};

/// Per-point residuals of one detector: measured minus fitted.
pub fn fit_residuals(values: &[f64], fitted: &[f64]) -> Vec<f64> {
    values.iter().zip(fitted).map(|(&v, &f)| v - f).collect()
}

/// Draws a same-length residual sample with replacement. Every point carries
/// the same statistical weight.
pub fn resample_row(residuals: &[f64], rng: &mut impl Rng) -> Vec<f64> {
    (0..residuals.len())
        .map(|_| residuals[rng.random_range(0..residuals.len())])
        .collect()
}

/// One bootstrap value matrix: fitted profile plus resampled residuals,
/// row by row.
pub fn bootstrap_replica(
    fitted: &[Vec<f64>],
    residuals: &[Vec<f64>],
    rng: &mut impl Rng,
) -> Vec<Vec<f64>> {
    fitted
        .iter()
        .zip(residuals)
        .map(|(fit_row, residual_row)| {
            let sample = resample_row(residual_row, rng);
            fit_row.iter().zip(&sample).map(|(&f, &r)| f + r).collect()
        })
        .collect()
}

/// One jackknife value matrix: column `column` removed from every row and a
/// zero column appended, keeping the grid length unchanged.
pub fn jackknife_replica(values: &[Vec<f64>], column: usize) -> Vec<Vec<f64>> {
    values
        .iter()
        .map(|row| {
            let mut replica: Vec<f64> = row
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != column)
                .map(|(_, &v)| v)
                .collect();
            replica.push(0.0);
            replica
        })
        .collect()
}

fn replace_values(points: &[PointData], values: Vec<Vec<f64>>) -> Vec<PointData> {
    points
        .iter()
        .zip(values)
        .map(|(data, replica_values)| PointData {
            x: data.x.clone(),
            values: replica_values,
            errors: data.errors.clone(),
        })
        .collect()
}

/// Runs the parent reduction, then `replica_count` bootstrap reductions
/// seeded deterministically. The parent history is returned first.
pub fn run_bootstrap(
    engine: &ReductionEngine<'_>,
    points: &[PointData],
    replica_count: usize,
    seed: u64,
) -> ReductionResult<Vec<ReductionHistory>> {
    let parent = engine.run_on_points(points)?;
    let fitted = &parent.last().total_profiles;
    let residuals: Vec<Vec<f64>> = points
        .iter()
        .zip(fitted)
        .map(|(data, fit_row)| fit_residuals(&data.values, fit_row))
        .collect();
    let fitted = fitted.clone();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut histories = Vec::with_capacity(replica_count + 1);
    histories.push(parent);
    for _ in 0..replica_count {
        let replica_values = bootstrap_replica(&fitted, &residuals, &mut rng);
        let replica = replace_values(points, replica_values);
        histories.push(engine.run_on_points(&replica)?);
    }
    Ok(histories)
}

/// Runs one jackknife reduction per data column. Returns one history per
/// column, in column order.
pub fn run_jackknife(
    engine: &ReductionEngine<'_>,
    points: &[PointData],
) -> ReductionResult<Vec<ReductionHistory>> {
    let columns = points.first().map_or(0, PointData::len);
    let values: Vec<Vec<f64>> = points.iter().map(|data| data.values.clone()).collect();
    let mut histories = Vec::with_capacity(columns);
    for column in 0..columns {
        let replica = replace_values(points, jackknife_replica(&values, column));
        histories.push(engine.run_on_points(&replica)?);
    }
    Ok(histories)
}
