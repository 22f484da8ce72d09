//! Baseline Calibrator - per-tag process-aware thresholds from long history
//!
//! Replaces one-size-fits-all sigma thresholds with profiles built offline
//! from months of running-state history:
//!
//! - Stability class from the coefficient of variation; very stable tags get
//!   a wider 4-sigma band, everything else keeps the default 2.5
//! - Limits are the tightest of statistical, IQR and engineering bands, then
//!   relaxed when too much of the history would already be "anomalous"
//! - Stuck and noisy sensors are flagged on the profile, never dropped
//!
//! ## Usage
//!
//! ```ignore
//! let calibrator = Calibrator::new(&config.calibration)?;
//! let profile = calibrator.calibrate_series(&running_series, window_end)?;
//! store.put_profile(&profile.tag_id, &profile)?;
//! ```

pub mod engineering;
pub mod stats;

pub use engineering::{EngineeringLimits, TagTypeRules};
pub use stats::{Quartiles, RunningStats};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::defaults::{DEFAULT_IQR_FACTOR, STABLE_IQR_FACTOR};
use crate::config::CalibrationConfig;
use crate::ml_engine::SampleQualityFilter;
use crate::state::{StateClassifier, StateSummary};
use crate::storage::{SourceError, StoreError};
use crate::types::{
    BaselineProfile, QualityFlag, Sensitivity, StabilityClass, TagSeries, UnitTable,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("Tag {tag} has {available} usable samples, calibration needs {required}")]
    InsufficientSamples {
        tag: String,
        available: usize,
        required: usize,
    },

    #[error("Invalid tag type pattern: {0}")]
    InvalidPattern(String),

    #[error("Cannot fetch history for {tag}: {source}")]
    Source {
        tag: String,
        #[source]
        source: SourceError,
    },

    #[error("Cannot store profile for {tag}: {source}")]
    Store {
        tag: String,
        #[source]
        source: StoreError,
    },
}

// ============================================================================
// Unit Summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub tag_id: String,
    pub flag: QualityFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFailure {
    pub tag_id: String,
    pub reason: String,
}

/// Per-unit overview of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub unit_id: String,
    pub tags_total: usize,
    pub calibrated: usize,
    pub stability_distribution: BTreeMap<StabilityClass, usize>,
    pub questionable_quality: Vec<QualityIssue>,
    /// Tags whose limits fall outside the physical range of their type
    pub implausible_limits: Vec<String>,
    pub failures: Vec<CalibrationFailure>,
    pub state: StateSummary,
}

/// Profiles produced for one unit, in input tag order, plus the summary.
#[derive(Debug, Clone)]
pub struct UnitCalibration {
    pub profiles: Vec<BaselineProfile>,
    pub summary: CalibrationSummary,
}

// ============================================================================
// Calibrator
// ============================================================================

pub struct Calibrator {
    config: CalibrationConfig,
    type_rules: TagTypeRules,
}

impl Calibrator {
    pub fn new(config: &CalibrationConfig) -> Result<Self, BaselineError> {
        Ok(Self {
            config: config.clone(),
            type_rules: TagTypeRules::new()?,
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn type_rules(&self) -> &TagTypeRules {
        &self.type_rules
    }

    /// Stability class for a coefficient of variation. An infinite CV (zero
    /// mean with spread) is variable.
    pub fn stability_class(&self, cv: f64) -> StabilityClass {
        let c = &self.config;
        if cv < c.very_stable_cv {
            StabilityClass::VeryStable
        } else if cv < c.stable_cv {
            StabilityClass::Stable
        } else if cv < c.moderately_stable_cv {
            StabilityClass::ModeratelyStable
        } else {
            StabilityClass::Variable
        }
    }

    pub fn sigma_for(&self, class: StabilityClass) -> f64 {
        match class {
            StabilityClass::VeryStable => self.config.very_stable_sigma,
            _ => self.config.default_sigma,
        }
    }

    pub fn quality_flag(&self, stuck_fraction: f64, noise_ratio: f64, cv: f64) -> QualityFlag {
        let c = &self.config;
        if stuck_fraction > c.max_stuck_fraction {
            QualityFlag::Stuck
        } else if noise_ratio > c.max_noise_ratio || cv > c.max_plausible_cv {
            QualityFlag::Noisy
        } else {
            QualityFlag::Good
        }
    }

    pub fn sensitivity(&self, class: StabilityClass, historical_rate: f64) -> Sensitivity {
        match class {
            StabilityClass::VeryStable | StabilityClass::Stable
                if historical_rate < self.config.low_sensitivity_max_rate =>
            {
                Sensitivity::Low
            }
            StabilityClass::ModeratelyStable
                if historical_rate < self.config.medium_sensitivity_max_rate =>
            {
                Sensitivity::Medium
            }
            _ => Sensitivity::High,
        }
    }

    /// Build a profile from finite history values. Pure: the same values,
    /// config and `calibrated_at` always give the same profile.
    pub fn profile_values(
        &self,
        tag_id: &str,
        values: &[f64],
        calibrated_at: DateTime<Utc>,
    ) -> Result<BaselineProfile, BaselineError> {
        let insufficient = || BaselineError::InsufficientSamples {
            tag: tag_id.to_string(),
            available: values.len(),
            required: self.config.min_samples,
        };
        if values.len() < self.config.min_samples.max(2) {
            return Err(insufficient());
        }

        let stats = RunningStats::from_values(values);
        let quartiles = Quartiles::of(values).ok_or_else(insufficient)?;
        let (mean, std) = (stats.mean, stats.std_dev());
        let cv = stats.cv();

        let stability_class = self.stability_class(cv);
        let sigma = self.sigma_for(stability_class);
        let tag_type = self.type_rules.classify(tag_id);
        let engineering = if self.config.engineering_limits {
            EngineeringLimits::for_type(tag_type, &stats)
        } else {
            EngineeringLimits::unbounded()
        };

        let iqr_factor = match stability_class {
            StabilityClass::VeryStable | StabilityClass::Stable => STABLE_IQR_FACTOR,
            _ => DEFAULT_IQR_FACTOR,
        };
        let statistical = (mean - sigma * std, mean + sigma * std);
        let iqr_band = (
            quartiles.q1 - iqr_factor * quartiles.iqr(),
            quartiles.q3 + iqr_factor * quartiles.iqr(),
        );

        let tightest = |a: (f64, f64), b: (f64, f64)| {
            (
                a.0.max(b.0).max(engineering.min_reasonable),
                a.1.min(b.1).min(engineering.max_reasonable),
            )
        };
        let (mut lower, mut upper) = tightest(statistical, iqr_band);
        let mut historical_outlier_rate = outlier_rate(values, lower, upper);

        if historical_outlier_rate > self.config.max_historical_outlier_rate {
            let f = self.config.relax_factor;
            let widen = |(lo, hi): (f64, f64)| (mean - (mean - lo) * f, mean + (hi - mean) * f);
            (lower, upper) = tightest(widen(statistical), widen(iqr_band));
            debug!(
                tag = %tag_id,
                rate_before = historical_outlier_rate,
                factor = f,
                "Relaxed calibration limits"
            );
            historical_outlier_rate = outlier_rate(values, lower, upper);
        }

        // lower <= mean <= upper must hold for every profile
        let lower = lower.min(mean);
        let upper = upper.max(mean);

        let stuck_fraction =
            stats::longest_flat_run(values, self.config.stuck_tolerance) as f64 / values.len() as f64;
        let noise_ratio = stats::noise_ratio(values);
        let quality_flag = self.quality_flag(stuck_fraction, noise_ratio, cv);

        Ok(BaselineProfile {
            tag_id: tag_id.to_string(),
            tag_type,
            stability_class,
            mean,
            std,
            // Zero mean with spread: keep the record serializable
            cv: if cv.is_finite() { cv } else { f64::MAX },
            median: quartiles.median,
            q1: quartiles.q1,
            q3: quartiles.q3,
            lower_limit: lower,
            upper_limit: upper,
            sigma_multiplier: sigma,
            quality_flag,
            stuck_fraction,
            noise_ratio,
            engineering_min: engineering.min_physical,
            engineering_max: engineering.max_physical,
            limits_plausible: engineering.contains(lower, upper),
            historical_outlier_rate,
            sensitivity: self.sensitivity(stability_class, historical_outlier_rate),
            sample_count: values.len(),
            calibrated_at,
        })
    }

    /// Profile one series. Non-finite readings are dropped first.
    pub fn calibrate_series(
        &self,
        series: &TagSeries,
        calibrated_at: DateTime<Utc>,
    ) -> Result<BaselineProfile, BaselineError> {
        let filtered = SampleQualityFilter::filter(series);
        if filtered.rejected > 0 {
            debug!(
                tag = %series.tag_id(),
                rejected = filtered.rejected,
                reason = ?filtered.rejection_reason,
                "Dropped non-finite history samples"
            );
        }

        let profile = self.profile_values(series.tag_id(), &filtered.series.values(), calibrated_at)?;
        if profile.quality_flag.is_low_quality() {
            warn!(
                tag = %profile.tag_id,
                quality = %profile.quality_flag,
                stuck_fraction = profile.stuck_fraction,
                noise_ratio = profile.noise_ratio,
                "Questionable sensor quality"
            );
        }
        if !profile.limits_plausible {
            warn!(
                tag = %profile.tag_id,
                tag_type = %profile.tag_type,
                lower = profile.lower_limit,
                upper = profile.upper_limit,
                "Calibrated limits outside physical range"
            );
        }
        Ok(profile)
    }

    /// Classify the unit's operating state, then profile each tag over its
    /// running rows only. Per-tag failures are collected, not raised.
    pub fn calibrate_unit(
        &self,
        unit_id: &str,
        series: &[TagSeries],
        classifier: &StateClassifier,
        calibrated_at: DateTime<Utc>,
    ) -> UnitCalibration {
        let table = UnitTable::align(unit_id, series);
        let proxies = classifier.proxies(&table);
        let state = classifier.classify_with(&table, &proxies);

        let results: Vec<(String, Result<BaselineProfile, BaselineError>)> = series
            .par_iter()
            .map(|s| {
                let running = state.running_subset(s);
                (s.tag_id().to_string(), self.calibrate_series(&running, calibrated_at))
            })
            .collect();

        let mut profiles = Vec::new();
        let mut failures = Vec::new();
        for (tag_id, result) in results {
            match result {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    warn!(unit = %unit_id, tag = %tag_id, error = %e, "Calibration skipped");
                    failures.push(CalibrationFailure {
                        tag_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut stability_distribution: BTreeMap<StabilityClass, usize> =
            StabilityClass::ALL.iter().map(|c| (*c, 0)).collect();
        for p in &profiles {
            *stability_distribution.entry(p.stability_class).or_default() += 1;
        }

        let summary = CalibrationSummary {
            unit_id: unit_id.to_string(),
            tags_total: series.len(),
            calibrated: profiles.len(),
            stability_distribution,
            questionable_quality: profiles
                .iter()
                .filter(|p| p.quality_flag.is_low_quality())
                .map(|p| QualityIssue {
                    tag_id: p.tag_id.clone(),
                    flag: p.quality_flag,
                })
                .collect(),
            implausible_limits: profiles
                .iter()
                .filter(|p| !p.limits_plausible)
                .map(|p| p.tag_id.clone())
                .collect(),
            failures,
            state: StateSummary::of(&state, &proxies),
        };

        info!(
            unit = %unit_id,
            tags = summary.tags_total,
            calibrated = summary.calibrated,
            questionable = summary.questionable_quality.len(),
            failed = summary.failures.len(),
            "Unit calibration complete"
        );

        UnitCalibration { profiles, summary }
    }
}

/// Share of `values` outside `[lower, upper]`.
fn outlier_rate(values: &[f64], lower: f64, upper: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let outside = values.iter().filter(|v| **v < lower || **v > upper).count();
    outside as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateConfig;
    use crate::types::{SeriesPoint, TagType};
    use chrono::{Duration, TimeZone};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn calibrator() -> Calibrator {
        Calibrator::new(&CalibrationConfig::default()).unwrap()
    }

    /// Smooth sinusoid with the given mean and sample CV (std = cv * mean).
    fn smooth(mean: f64, cv: f64, n: usize) -> Vec<f64> {
        let amplitude = cv * mean * std::f64::consts::SQRT_2;
        // 2000 samples cover ~16 full periods, keeping sample std close to a/sqrt(2)
        (0..n)
            .map(|i| mean + amplitude * (i as f64 * 0.05).sin())
            .collect()
    }

    fn series(tag: &str, values: &[f64]) -> TagSeries {
        TagSeries::new(
            tag,
            "K-31-01",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint::new(at() + Duration::minutes(i as i64), *v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_very_stable_gets_four_sigma() {
        let profile = calibrator()
            .profile_values("TI-4410", &smooth(100.0, 0.02, 2000), at())
            .unwrap();
        assert_eq!(profile.stability_class, StabilityClass::VeryStable);
        assert_eq!(profile.sigma_multiplier, 4.0);
        assert_eq!(profile.quality_flag, QualityFlag::Good);
        assert_eq!(profile.tag_type, TagType::Temperature);
        assert!(profile.lower_limit <= profile.mean && profile.mean <= profile.upper_limit);
    }

    #[test]
    fn test_stability_breaks() {
        let c = calibrator();
        assert_eq!(c.stability_class(0.0), StabilityClass::VeryStable);
        assert_eq!(c.stability_class(0.03), StabilityClass::Stable);
        assert_eq!(c.stability_class(0.07), StabilityClass::ModeratelyStable);
        assert_eq!(c.stability_class(0.5), StabilityClass::Variable);
        assert_eq!(c.stability_class(f64::INFINITY), StabilityClass::Variable);
        assert_eq!(c.sigma_for(StabilityClass::Variable), 2.5);
    }

    #[test]
    fn test_zero_mean_is_variable() {
        let values: Vec<f64> = (0..500).map(|i| (i as f64 * 0.05).sin()).collect();
        let profile = calibrator().profile_values("XI-1", &values, at()).unwrap();
        assert_eq!(profile.stability_class, StabilityClass::Variable);
        assert!(profile.cv.is_finite());
    }

    #[test]
    fn test_insufficient_samples() {
        let err = calibrator()
            .profile_values("PI-1", &[1.0; 20], at())
            .unwrap_err();
        assert!(matches!(
            err,
            BaselineError::InsufficientSamples {
                available: 20,
                required: 100,
                ..
            }
        ));
    }

    #[test]
    fn test_stuck_sensor_flagged_not_dropped() {
        let mut values = smooth(50.0, 0.05, 1000);
        for v in values.iter_mut().skip(300).take(200) {
            *v = 49.7;
        }
        let profile = calibrator().profile_values("PI-2201", &values, at()).unwrap();
        assert_eq!(profile.quality_flag, QualityFlag::Stuck);
        assert!(profile.stuck_fraction >= 0.2);
    }

    #[test]
    fn test_noisy_sensor_flagged() {
        let values: Vec<f64> = (0..1000).map(|i| if i % 2 == 0 { 48.0 } else { 52.0 }).collect();
        let profile = calibrator().profile_values("FI-1203", &values, at()).unwrap();
        assert_eq!(profile.quality_flag, QualityFlag::Noisy);
    }

    #[test]
    fn test_flat_history_brackets_mean() {
        let profile = calibrator().profile_values("LI-07", &[42.0; 300], at()).unwrap();
        assert_eq!(profile.lower_limit, 42.0);
        assert_eq!(profile.upper_limit, 42.0);
        assert_eq!(profile.quality_flag, QualityFlag::Stuck);
    }

    #[test]
    fn test_limits_bracket_mean_outside_reasonable_band() {
        // Temperature above the 500 degree reasonable cap
        let values = smooth(650.0, 0.01, 1000);
        let profile = calibrator().profile_values("TI-900", &values, at()).unwrap();
        assert!(profile.lower_limit <= profile.mean);
        assert!(profile.mean <= profile.upper_limit);
    }

    #[test]
    fn test_negative_pressure_is_implausible() {
        let values = smooth(-20.0, 0.1, 1000);
        let profile = calibrator().profile_values("PI-100", &values, at()).unwrap();
        assert_eq!(profile.engineering_min, Some(0.0));
        assert!(!profile.limits_plausible);
    }

    #[test]
    fn test_engineering_limits_can_be_disabled() {
        let config = CalibrationConfig {
            engineering_limits: false,
            ..CalibrationConfig::default()
        };
        let c = Calibrator::new(&config).unwrap();
        let profile = c.profile_values("PI-100", &smooth(-20.0, 0.1, 1000), at()).unwrap();
        assert_eq!(profile.engineering_min, None);
        assert!(profile.limits_plausible);
    }

    #[test]
    fn test_sensitivity_mapping() {
        let c = calibrator();
        assert_eq!(c.sensitivity(StabilityClass::Stable, 0.01), Sensitivity::Low);
        assert_eq!(c.sensitivity(StabilityClass::Stable, 0.05), Sensitivity::High);
        assert_eq!(c.sensitivity(StabilityClass::ModeratelyStable, 0.02), Sensitivity::Medium);
        assert_eq!(c.sensitivity(StabilityClass::Variable, 0.0), Sensitivity::High);
    }

    #[test]
    fn test_calibration_is_idempotent() {
        let values = smooth(75.0, 0.04, 1500);
        let c = calibrator();
        let a = c.profile_values("TI-1", &values, at()).unwrap();
        let b = c.profile_values("TI-1", &values, at()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_calibrate_series_ignores_non_finite() {
        let mut values = smooth(75.0, 0.04, 500);
        values[10] = f64::NAN;
        values[20] = f64::INFINITY;
        let profile = calibrator().calibrate_series(&series("TI-1", &values), at()).unwrap();
        assert_eq!(profile.sample_count, 498);
        assert!(profile.mean.is_finite());
    }

    #[test]
    fn test_calibrate_unit_uses_running_rows() {
        // Speed proxy: stopped for the first 200 rows, running after
        let speed: Vec<f64> = (0..1000).map(|i| if i < 200 { 0.0 } else { 3000.0 }).collect();
        let mut temp = smooth(80.0, 0.02, 1000);
        for v in temp.iter_mut().take(200) {
            *v = 20.0;
        }
        let unit = vec![series("SI-100", &speed), series("TI-200", &temp), series("PI-9", &[1.0; 5])];

        let classifier = StateClassifier::new(&StateConfig::default()).unwrap();
        let out = calibrator().calibrate_unit("K-31-01", &unit, &classifier, at());

        let ti = out.profiles.iter().find(|p| p.tag_id == "TI-200").unwrap();
        assert_eq!(ti.sample_count, 800);
        assert_eq!(ti.stability_class, StabilityClass::VeryStable);
        assert_eq!(out.summary.failures.len(), 1);
        assert_eq!(out.summary.failures[0].tag_id, "PI-9");
        assert_eq!(out.summary.tags_total, 3);
        assert_eq!(out.summary.state.proxies, vec!["SI-100".to_string()]);
    }
}
