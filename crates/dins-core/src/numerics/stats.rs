//! NaN-aware statistics used by the cross-detector aggregation step.
//!
//! `nan_mean`/`nan_std` skip NaN entries (a masked detector drops out of the
//! statistic); plain `sum` is used where NaN must poison the whole row
//! instead. Population standard deviation, matching the legacy reduction.

/// Mean over finite entries; NaN when no entry is finite.
pub fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0_usize;
    for &value in values {
        if !value.is_nan() {
            sum += value;
            count += 1;
        }
    }
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Population standard deviation over non-NaN entries; NaN when empty.
pub fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let mut sum = 0.0;
    let mut count = 0_usize;
    for &value in values {
        if !value.is_nan() {
            let deviation = value - mean;
            sum += deviation * deviation;
            count += 1;
        }
    }
    (sum / count as f64).sqrt()
}
