//! Candidate Detector: adaptive sigma flagging over the running subset.
//!
//! `|value - mean| > sigma * std`, where mean/std come from the calibrated
//! profile when one exists and from the running samples otherwise, and sigma
//! is nudged by how steady the unit's speed/flow proxy was.

use serde::{Deserialize, Serialize};

use super::Degradation;
use crate::baseline::stats::RunningStats;
use crate::config::PrimaryConfig;
use crate::types::{AnomalyCandidate, BaselineProfile, TagSeries};

/// Where the detector's statistics came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    Profile,
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrimaryStats {
    pub mean: f64,
    pub std: f64,
    pub sigma: f64,
    pub source: StatsSource,
}

#[derive(Debug, Clone, Default)]
pub struct PrimaryResult {
    pub candidates: Vec<AnomalyCandidate>,
    pub stats: Option<PrimaryStats>,
    pub degradations: Vec<Degradation>,
}

/// Sigma after the proxy-variability adjustment, clamped to the configured range.
pub fn adjusted_sigma(base: f64, proxy_cv: Option<f64>, config: &PrimaryConfig) -> f64 {
    let delta = match proxy_cv {
        Some(cv) if cv > config.high_cv => config.high_cv_delta,
        Some(cv) if cv < config.low_cv => config.low_cv_delta,
        _ => 0.0,
    };
    (base + delta).clamp(config.min_sigma, config.max_sigma)
}

/// Flag candidates in `running`, the tag's running-state samples.
///
/// Pure function of its inputs. Too few samples or a series with no spread
/// yields no candidates and a recorded degradation, never an error.
pub fn detect_candidates(
    running: &TagSeries,
    profile: Option<&BaselineProfile>,
    proxy_cv: Option<f64>,
    config: &PrimaryConfig,
) -> PrimaryResult {
    let mut result = PrimaryResult::default();

    if running.len() < config.min_samples {
        result.degradations.push(Degradation::InsufficientData {
            stage: "primary".to_string(),
            available: running.len(),
            required: config.min_samples,
        });
        return result;
    }

    let usable_profile = profile.filter(|p| p.std.is_finite() && p.std > 0.0 && p.mean.is_finite());
    let (mean, std, base, source) = match usable_profile {
        Some(p) => (p.mean, p.std, p.sigma_multiplier, StatsSource::Profile),
        None => {
            if profile.is_some() {
                result.degradations.push(Degradation::DegenerateStatistics {
                    stage: "primary".to_string(),
                    detail: "profile has no usable spread, using window statistics".to_string(),
                });
            } else {
                result.degradations.push(Degradation::ConfigurationMissing);
            }
            let stats = RunningStats::from_values(&running.values());
            if !stats.has_spread() {
                result.degradations.push(Degradation::DegenerateStatistics {
                    stage: "primary".to_string(),
                    detail: "running samples are constant".to_string(),
                });
                return result;
            }
            (stats.mean, stats.std_dev(), config.base_sigma, StatsSource::Computed)
        }
    };

    let sigma = adjusted_sigma(base, proxy_cv, config);
    let limit = sigma * std;

    result.candidates = running
        .points()
        .iter()
        .filter(|p| (p.value - mean).abs() > limit)
        .map(|p| AnomalyCandidate::primary(running.tag_id(), p.timestamp, p.value, (p.value - mean) / std))
        .collect();
    result.stats = Some(PrimaryStats {
        mean,
        std,
        sigma,
        source,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DetectionStage, QualityFlag, SeriesPoint, Sensitivity, StabilityClass, TagType,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64]) -> TagSeries {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        TagSeries::new(
            "TI-100",
            "K-31-01",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint::new(t0 + Duration::minutes(i as i64), *v))
                .collect(),
        )
        .unwrap()
    }

    fn profile(mean: f64, std: f64, sigma: f64) -> BaselineProfile {
        BaselineProfile {
            tag_id: "TI-100".to_string(),
            tag_type: TagType::Temperature,
            stability_class: StabilityClass::VeryStable,
            mean,
            std,
            cv: std / mean,
            median: mean,
            q1: mean - std,
            q3: mean + std,
            lower_limit: mean - sigma * std,
            upper_limit: mean + sigma * std,
            sigma_multiplier: sigma,
            quality_flag: QualityFlag::Good,
            stuck_fraction: 0.0,
            noise_ratio: 0.1,
            engineering_min: None,
            engineering_max: None,
            limits_plausible: true,
            historical_outlier_rate: 0.0,
            sensitivity: Sensitivity::Low,
            sample_count: 1000,
            calibrated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_sigma_adjustment_and_clamp() {
        let cfg = PrimaryConfig::default();
        assert_eq!(adjusted_sigma(2.5, None, &cfg), 2.5);
        assert!((adjusted_sigma(2.5, Some(0.3), &cfg) - 2.2).abs() < 1e-12);
        assert!((adjusted_sigma(2.5, Some(0.01), &cfg) - 2.7).abs() < 1e-12);
        assert_eq!(adjusted_sigma(2.5, Some(0.1), &cfg), 2.5);
        assert_eq!(adjusted_sigma(4.0, Some(0.01), &cfg), 4.0);
        assert_eq!(adjusted_sigma(1.6, Some(0.5), &cfg), 1.5);
    }

    #[test]
    fn test_short_series_yields_nothing() {
        let result = detect_candidates(&series(&[1.0, 2.0, 100.0]), None, None, &PrimaryConfig::default());
        assert!(result.candidates.is_empty());
        assert!(matches!(
            result.degradations[0],
            Degradation::InsufficientData { available: 3, .. }
        ));
    }

    #[test]
    fn test_flat_series_yields_nothing() {
        let result = detect_candidates(&series(&[50.0; 200]), None, None, &PrimaryConfig::default());
        assert!(result.candidates.is_empty());
        assert!(result.stats.is_none());
    }

    #[test]
    fn test_spike_is_flagged_with_z_score() {
        let mut values: Vec<f64> = (0..200).map(|i| 50.0 + (i as f64 * 0.7).sin()).collect();
        values[120] = 65.0;
        let result = detect_candidates(&series(&values), None, None, &PrimaryConfig::default());
        let spike = result
            .candidates
            .iter()
            .find(|c| c.value == 65.0)
            .expect("spike flagged");
        assert!(spike.z_score > 2.5);
        assert_eq!(spike.stage(), Some(DetectionStage::Primary));
        assert_eq!(result.stats.unwrap().source, StatsSource::Computed);
        assert!(result.degradations.contains(&Degradation::ConfigurationMissing));
    }

    #[test]
    fn test_profile_statistics_take_precedence() {
        // Window statistics would flag nothing; the tight profile flags 52.0
        let values: Vec<f64> = (0..100).map(|i| if i % 10 == 0 { 52.0 } else { 50.0 }).collect();
        let p = profile(50.0, 0.1, 4.0);
        let result = detect_candidates(&series(&values), Some(&p), None, &PrimaryConfig::default());
        assert_eq!(result.candidates.len(), 10);
        let stats = result.stats.unwrap();
        assert_eq!(stats.source, StatsSource::Profile);
        assert_eq!(stats.sigma, 4.0);
        assert!(result.degradations.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let values: Vec<f64> = (0..300).map(|i| ((i * 37 % 101) as f64) / 10.0).collect();
        let a = detect_candidates(&series(&values), None, Some(0.1), &PrimaryConfig::default());
        let b = detect_candidates(&series(&values), None, Some(0.1), &PrimaryConfig::default());
        assert_eq!(a.candidates, b.candidates);
    }
}
