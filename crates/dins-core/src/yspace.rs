//! Post-reduction steps toward the y-space analysis of the lightest mass:
//! isolation of the first mass, cross-detector weighted averaging and
//! symmetrisation about y = 0.

/// Subtracts every fitted mass profile except the first from the measured
/// values, leaving (ideally) only the lightest mass's signal.
///
/// `mass_profiles` is indexed `[detector][mass][point]`, as recorded by the
/// reduction.
pub fn subtract_all_masses_except_first(
    values: &[Vec<f64>],
    mass_profiles: &[Vec<Vec<f64>>],
) -> Vec<Vec<f64>> {
    values
        .iter()
        .zip(mass_profiles)
        .map(|(row, profiles)| {
            let mut isolated = row.clone();
            for profile in profiles.iter().skip(1) {
                for (value, &fitted) in isolated.iter_mut().zip(profile) {
                    *value -= fitted;
                }
            }
            isolated
        })
        .collect()
}

/// Column-wise inverse-variance average across detectors.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedAverage {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

/// Averages the detector rows column by column with inverse-variance weights.
///
/// Zero values and zero errors mark rebinning cut-offs and are treated as
/// missing; a column with no contributing detector comes out as NaN with an
/// infinite error.
pub fn weighted_average(values: &[Vec<f64>], errors: &[Vec<f64>]) -> WeightedAverage {
    let columns = values.first().map_or(0, Vec::len);
    let mut mean_values = Vec::with_capacity(columns);
    let mut mean_errors = Vec::with_capacity(columns);

    for column in 0..columns {
        let mut numerator = 0.0;
        let mut weight_sum = 0.0;
        for (row_values, row_errors) in values.iter().zip(errors) {
            let value = row_values[column];
            let error = row_errors[column];
            if value == 0.0 || error == 0.0 || value.is_nan() || error.is_nan() {
                continue;
            }
            let weight = 1.0 / (error * error);
            numerator += value * weight;
            weight_sum += weight;
        }
        mean_values.push(numerator / weight_sum);
        mean_errors.push((1.0 / weight_sum).sqrt());
    }

    WeightedAverage {
        values: mean_values,
        errors: mean_errors,
    }
}

/// Symmetrises a profile about the centre of its grid by averaging each
/// point with its mirror. Applied to values and errors alike.
pub fn symmetrize(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    (0..n).map(|i| (data[i] + data[n - 1 - i]) / 2.0).collect()
}
