//! Verification Stage A: Modified Thompson Tau over a local time window.
//!
//! A candidate survives when its distance from the local window mean, in
//! units of the window std, exceeds the critical tau for the window size.
//! Windows too small to be meaningful widen to the whole running series.

use chrono::Duration;

use crate::baseline::stats::{is_negligible, RunningStats};
use crate::config::MtdConfig;
use crate::types::{AnomalyCandidate, DropReason, StageEvent, TagSeries};

/// Tau test for one value against its window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TauTest {
    pub tau: f64,
    pub tau_critical: f64,
    pub window_len: usize,
    pub passed: bool,
    /// Window had no spread; `tau` is infinite when the value differs from it
    pub flat_window: bool,
}

pub fn tau_test(value: f64, window: &[f64], config: &MtdConfig) -> TauTest {
    let stats = RunningStats::from_values(window);
    let tau_critical = config.tau_critical(window.len());

    if !stats.has_spread() {
        let differs = !is_negligible(value - stats.mean, stats.mean);
        return TauTest {
            tau: if differs { f64::INFINITY } else { 0.0 },
            tau_critical,
            window_len: window.len(),
            passed: differs,
            flat_window: true,
        };
    }

    let tau = (value - stats.mean).abs() / stats.std_dev();
    TauTest {
        tau,
        tau_critical,
        window_len: window.len(),
        passed: tau > tau_critical,
        flat_window: false,
    }
}

/// Run every candidate through the tau test against `running`, the tag's
/// running-state samples. Returns all candidates, advanced or dropped.
pub fn verify(
    candidates: Vec<AnomalyCandidate>,
    running: &TagSeries,
    config: &MtdConfig,
) -> Vec<AnomalyCandidate> {
    let half_width = Duration::minutes(config.window_minutes);
    let full: Vec<f64> = running.values();

    candidates
        .into_iter()
        .map(|candidate| {
            let local: Vec<f64> = running
                .between(candidate.timestamp - half_width, candidate.timestamp + half_width)
                .iter()
                .map(|p| p.value)
                .collect();
            let window = if local.len() < config.min_window_samples {
                &full
            } else {
                &local
            };

            let test = tau_test(candidate.value, window, config);
            let event = if test.passed {
                StageEvent::MtdConfirmed {
                    tau: test.tau,
                    tau_critical: test.tau_critical,
                }
            } else if test.flat_window {
                StageEvent::MtdRejected {
                    reason: DropReason::FlatWindow,
                }
            } else {
                StageEvent::MtdRejected {
                    reason: DropReason::BelowTauCritical,
                }
            };
            candidate.advance(event)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateStage, DetectionStage, SeriesPoint};
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn series(values: &[f64], step_minutes: i64) -> TagSeries {
        TagSeries::new(
            "PI-200",
            "K-31-01",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint::new(t0() + Duration::minutes(i as i64 * step_minutes), *v))
                .collect(),
        )
        .unwrap()
    }

    fn candidate_at(s: &TagSeries, i: usize) -> AnomalyCandidate {
        let p = s.points()[i];
        AnomalyCandidate::primary(s.tag_id(), p.timestamp, p.value, 10.0)
    }

    #[test]
    fn test_flat_window_keeps_distinct_value() {
        let cfg = MtdConfig::default();
        let test = tau_test(65.0, &[50.0; 20], &cfg);
        assert!(test.passed);
        assert!(test.flat_window);
        assert!(test.tau.is_infinite());

        let test = tau_test(50.0, &[50.0; 20], &cfg);
        assert!(!test.passed);
    }

    #[test]
    fn test_injected_outlier_in_flat_series_survives() {
        let mut values = vec![50.0; 300];
        values[150] = 65.0;
        let s = series(&values, 1);
        let out = verify(vec![candidate_at(&s, 150)], &s, &MtdConfig::default());
        assert_eq!(out[0].stage(), Some(DetectionStage::PrimaryMtd));
        match out[0].stage_reached {
            CandidateStage::MtdVerified { tau, tau_critical } => {
                assert!(tau > tau_critical);
                // 121 samples inside ±60 minutes
                assert_eq!(tau_critical, 1.5);
            }
            other => panic!("unexpected stage {other:?}"),
        }
    }

    #[test]
    fn test_sparse_window_widens_to_full_series() {
        // Hourly samples: the ±60 minute window holds only 3 points
        let mut values: Vec<f64> = (0..40).map(|i| 10.0 + (i % 4) as f64 * 0.1).collect();
        values[20] = 30.0;
        let s = series(&values, 60);
        let out = verify(vec![candidate_at(&s, 20)], &s, &MtdConfig::default());
        match out[0].stage_reached {
            CandidateStage::MtdVerified { tau_critical, .. } => {
                // 40 samples in the widened window
                assert_eq!(tau_critical, 1.4);
            }
            other => panic!("unexpected stage {other:?}"),
        }
    }

    #[test]
    fn test_ordinary_value_is_dropped() {
        let values: Vec<f64> = (0..200).map(|i| 50.0 + (i as f64 * 0.9).sin()).collect();
        let s = series(&values, 1);
        // The value closest to the mean cannot be a local outlier
        let (i, _) = values
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - 50.0).abs().total_cmp(&(b.1 - 50.0).abs()))
            .unwrap();
        let out = verify(vec![candidate_at(&s, i)], &s, &MtdConfig::default());
        assert!(out[0].is_dropped());
        assert!(matches!(
            out[0].stage_reached,
            CandidateStage::Dropped {
                reason: DropReason::BelowTauCritical,
                ..
            }
        ));
    }
}
