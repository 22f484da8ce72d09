//! Verification Stage B: isolation forest cross-check of MTD survivors.
//!
//! The forest is trained on standardized feature rows of the tag's whole
//! running series, so it judges the shape around each survivor rather than
//! the value alone. Any training problem leaves the survivors at
//! `primary+mtd` and is reported as a degradation.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::Degradation;
use crate::config::IsolationConfig;
use crate::ml_engine::{outlier_threshold, FeatureMatrix, ForestParams, IsolationForest};
use crate::types::{AnomalyCandidate, CandidateStage, StageEvent, TagSeries};

#[derive(Debug, Clone, Default)]
pub struct IsolationResult {
    pub candidates: Vec<AnomalyCandidate>,
    pub contamination: Option<f64>,
    pub threshold: Option<f64>,
    pub degradation: Option<Degradation>,
}

fn is_mtd_survivor(c: &AnomalyCandidate) -> bool {
    matches!(c.stage_reached, CandidateStage::MtdVerified { .. })
}

/// Row of `running` holding the candidate's sample.
fn row_index(running: &TagSeries, timestamp: DateTime<Utc>, value: f64) -> Option<usize> {
    let points = running.points();
    let start = points.partition_point(|p| p.timestamp < timestamp);
    points[start..]
        .iter()
        .take_while(|p| p.timestamp == timestamp)
        .position(|p| p.value == value)
        .map(|offset| start + offset)
}

pub fn verify(
    candidates: Vec<AnomalyCandidate>,
    running: &TagSeries,
    config: &IsolationConfig,
) -> IsolationResult {
    let survivors = candidates.iter().filter(|c| is_mtd_survivor(c)).count();
    if survivors == 0 {
        return IsolationResult {
            candidates,
            ..Default::default()
        };
    }

    let degrade = |candidates: Vec<AnomalyCandidate>, reason: String| {
        debug!(tag = %running.tag_id(), reason = %reason, "Isolation stage skipped");
        IsolationResult {
            candidates,
            contamination: None,
            threshold: None,
            degradation: Some(Degradation::ModelTrainingFailure { reason }),
        }
    };

    if running.len() < config.min_training_samples {
        return degrade(
            candidates,
            format!(
                "{} running samples, need {}",
                running.len(),
                config.min_training_samples
            ),
        );
    }

    let features = FeatureMatrix::from_values(&running.values(), config.rolling_window);
    if features.degenerate_columns().len() == crate::ml_engine::FEATURE_COUNT {
        return degrade(candidates, "all feature columns are constant".to_string());
    }
    let features = features.standardized();

    // Every first-pass candidate counts toward the observed rate, including
    // those MTD dropped
    let contamination =
        (candidates.len() as f64 / running.len() as f64).min(config.contamination_cap);
    let params = ForestParams {
        n_trees: config.n_trees,
        max_samples: config.max_samples,
        seed: config.seed,
    };

    let trained = IsolationForest::fit(features.rows(), &params).and_then(|forest| {
        let scores = forest.score_rows(features.rows())?;
        let threshold = outlier_threshold(&scores, contamination)?;
        Ok((scores, threshold))
    });
    let (scores, threshold) = match trained {
        Ok(t) => t,
        Err(e) => return degrade(candidates, e.to_string()),
    };

    let candidates = candidates
        .into_iter()
        .map(|c| {
            if !is_mtd_survivor(&c) {
                return c;
            }
            match row_index(running, c.timestamp, c.value) {
                Some(row) => {
                    let if_score = scores[row];
                    let event = if if_score > threshold {
                        StageEvent::IfConfirmed { if_score }
                    } else {
                        StageEvent::IfRejected { if_score }
                    };
                    c.advance(event)
                }
                None => c,
            }
        })
        .collect();

    IsolationResult {
        candidates,
        contamination: Some(contamination),
        threshold: Some(threshold),
        degradation: None,
    }
}
