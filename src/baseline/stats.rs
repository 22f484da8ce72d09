//! Running and order statistics shared by calibration and detection.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics};

/// Relative spread below which a window is treated as constant. Guards
/// against round-off making a flat series look like it has a tiny std.
const NEGLIGIBLE_SPREAD: f64 = 1e-12;

/// Mean/variance accumulator using Welford's online algorithm.
///
/// Non-finite values are ignored: a single NaN would otherwise corrupt the
/// mean and M2 for good.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: usize,
    pub mean: f64,
    m2: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: &[f64]) -> Self {
        let mut stats = Self::new();
        values.iter().for_each(|v| stats.push(*v));
        stats
    }

    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Sample variance (n - 1 denominator); 0 below two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// False when the values are constant up to floating-point noise.
    pub fn has_spread(&self) -> bool {
        !is_negligible(self.std_dev(), self.mean)
    }

    /// Coefficient of variation `std / |mean|`. Zero spread gives 0; a zero
    /// mean with spread gives infinity.
    pub fn cv(&self) -> f64 {
        let std = self.std_dev();
        if !self.has_spread() {
            0.0
        } else if self.mean == 0.0 {
            f64::INFINITY
        } else {
            std / self.mean.abs()
        }
    }

    pub fn range(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max_value - self.min_value
        }
    }
}

/// True when `deviation` is indistinguishable from zero at the scale of `reference`.
pub fn is_negligible(deviation: f64, reference: f64) -> bool {
    deviation.abs() <= NEGLIGIBLE_SPREAD * reference.abs().max(1.0)
}

/// Median and quartiles of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    /// `None` for an empty sample.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut data = Data::new(values.to_vec());
        Some(Self {
            q1: data.lower_quartile(),
            median: data.median(),
            q3: data.upper_quartile(),
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Longest run of consecutive values differing by less than `tolerance`.
pub fn longest_flat_run(values: &[f64], tolerance: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let mut longest = 1;
    let mut current = 1;
    for w in values.windows(2) {
        if (w[1] - w[0]).abs() < tolerance {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 1;
        }
    }
    longest
}

/// std(first differences) / std(values); 0 when the values have no spread.
pub fn noise_ratio(values: &[f64]) -> f64 {
    let signal = RunningStats::from_values(values);
    if values.len() < 3 || !signal.has_spread() {
        return 0.0;
    }
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    RunningStats::from_values(&diffs).std_dev() / signal.std_dev()
}
