//! Data Quality Filter for tag series
//!
//! Archive exports carry NaN for bad-quality readings and occasionally
//! overflowed values. Those never reach a statistics stage:
//! - NaN readings (archive "bad" quality)
//! - Infinite readings (overflow, divide-by-zero in calculated tags)

use crate::types::TagSeries;

/// Result of quality filtering
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Series with only finite readings, order preserved
    pub series: TagSeries,
    pub rejected: usize,
    /// Primary reason for rejections (if any)
    pub rejection_reason: Option<String>,
}

impl FilterResult {
    pub fn all_rejected(&self) -> bool {
        self.series.is_empty() && self.rejected > 0
    }
}

pub struct SampleQualityFilter;

impl SampleQualityFilter {
    pub fn filter(series: &TagSeries) -> FilterResult {
        let mut nan_count = 0;
        let mut infinite_count = 0;

        for p in series.points() {
            match Self::validate(p.value) {
                Ok(()) => {}
                Err(RejectionReason::NotANumber) => nan_count += 1,
                Err(RejectionReason::Infinite) => infinite_count += 1,
            }
        }

        let rejected = nan_count + infinite_count;
        if rejected == 0 {
            return FilterResult {
                series: series.clone(),
                rejected: 0,
                rejection_reason: None,
            };
        }

        let rejection_reason = [
            (nan_count, "NaN reading (bad archive quality)"),
            (infinite_count, "Infinite reading (overflow)"),
        ]
        .into_iter()
        .max_by_key(|(count, _)| *count)
        .filter(|(count, _)| *count > 0)
        .map(|(count, reason)| format!("{reason} ({count} samples)"));

        FilterResult {
            series: series.filtered(|p| Self::validate(p.value).is_ok()),
            rejected,
            rejection_reason,
        }
    }

    fn validate(value: f64) -> Result<(), RejectionReason> {
        if value.is_nan() {
            return Err(RejectionReason::NotANumber);
        }
        if value.is_infinite() {
            return Err(RejectionReason::Infinite);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectionReason {
    NotANumber,
    Infinite,
}
