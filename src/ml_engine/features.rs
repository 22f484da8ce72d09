//! Per-sample feature rows for the isolation ensemble.
//!
//! Columns: value, lag-1 value, first difference, rolling mean, rolling std.
//! Rolling statistics use every available sample up to the window size, so
//! the first rows are computed over shorter windows. The rolling std of a
//! single sample is 0.

pub const FEATURE_COUNT: usize = 5;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "value",
    "value_lag1",
    "value_diff",
    "value_rolling_mean",
    "value_rolling_std",
];

pub type FeatureRow = [f64; FEATURE_COUNT];

/// Feature rows, one per input sample, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn from_values(values: &[f64], rolling_window: usize) -> Self {
        let window = rolling_window.max(1);
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                // First row has no predecessor: lag is the value itself
                let lag1 = if i == 0 { value } else { values[i - 1] };
                let start = (i + 1).saturating_sub(window);
                let (mean, std) = sample_mean_std(&values[start..=i]);
                [value, lag1, value - lag1, mean, std]
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Indices of columns with no spread.
    pub fn degenerate_columns(&self) -> Vec<usize> {
        (0..FEATURE_COUNT)
            .filter(|&c| column_stats(&self.rows, c).is_none())
            .collect()
    }

    /// Z-score every column. Columns with no spread become all zeros.
    pub fn standardized(&self) -> Self {
        let mut rows = self.rows.clone();
        for c in 0..FEATURE_COUNT {
            match column_stats(&self.rows, c) {
                Some((mean, std)) => rows.iter_mut().for_each(|r| r[c] = (r[c] - mean) / std),
                None => rows.iter_mut().for_each(|r| r[c] = 0.0),
            }
        }
        Self { rows }
    }
}

/// Population mean/std of one column, `None` when the column is constant
/// (up to floating-point noise) or empty.
fn column_stats(rows: &[FeatureRow], c: usize) -> Option<(f64, f64)> {
    if rows.is_empty() {
        return None;
    }
    let n = rows.len() as f64;
    let mean = rows.iter().map(|r| r[c]).sum::<f64>() / n;
    let var = rows.iter().map(|r| (r[c] - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std <= 1e-12 * mean.abs().max(1.0) {
        None
    } else {
        Some((mean, std))
    }
}

fn sample_mean_std(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    if window.len() < 2 {
        return (mean, 0.0);
    }
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}
