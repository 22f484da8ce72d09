//! Anomaly candidates, their forward-only stage machine, and the final record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last verification stage a surviving anomaly passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectionStage {
    #[serde(rename = "primary")]
    Primary,
    #[serde(rename = "primary+mtd")]
    PrimaryMtd,
    #[serde(rename = "primary+mtd+if")]
    PrimaryMtdIf,
}

impl std::fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::PrimaryMtd => write!(f, "primary+mtd"),
            Self::PrimaryMtdIf => write!(f, "primary+mtd+if"),
        }
    }
}

/// Why a candidate left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// τ did not exceed the sample-size critical value
    BelowTauCritical,
    /// Local window had zero spread and the value equals its mean
    FlatWindow,
    /// Isolation ensemble scored the sample as an inlier
    NotIsolated,
}

/// Outcome of a verification stage applied to a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageEvent {
    MtdConfirmed { tau: f64, tau_critical: f64 },
    MtdRejected { reason: DropReason },
    IfConfirmed { if_score: f64 },
    IfRejected { if_score: f64 },
}

/// Candidate progression: Primary → MtdVerified → IfVerified, or Dropped.
///
/// Events that do not apply to the current state leave it unchanged, so a
/// stage can never move backwards and a dropped candidate never returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CandidateStage {
    Primary,
    MtdVerified {
        tau: f64,
        tau_critical: f64,
    },
    IfVerified {
        tau: f64,
        tau_critical: f64,
        if_score: f64,
    },
    Dropped {
        at: DetectionStage,
        reason: DropReason,
    },
}

impl CandidateStage {
    pub fn apply(self, event: StageEvent) -> Self {
        match (self, event) {
            (Self::Primary, StageEvent::MtdConfirmed { tau, tau_critical }) => {
                Self::MtdVerified { tau, tau_critical }
            }
            (Self::Primary, StageEvent::MtdRejected { reason }) => Self::Dropped {
                at: DetectionStage::Primary,
                reason,
            },
            (Self::MtdVerified { tau, tau_critical }, StageEvent::IfConfirmed { if_score }) => {
                Self::IfVerified {
                    tau,
                    tau_critical,
                    if_score,
                }
            }
            (Self::MtdVerified { .. }, StageEvent::IfRejected { .. }) => Self::Dropped {
                at: DetectionStage::PrimaryMtd,
                reason: DropReason::NotIsolated,
            },
            (state, _) => state,
        }
    }

    /// Stage reached, or `None` once dropped.
    pub fn reached(&self) -> Option<DetectionStage> {
        match self {
            Self::Primary => Some(DetectionStage::Primary),
            Self::MtdVerified { .. } => Some(DetectionStage::PrimaryMtd),
            Self::IfVerified { .. } => Some(DetectionStage::PrimaryMtdIf),
            Self::Dropped { .. } => None,
        }
    }
}

/// A sample flagged by the primary detector; ephemeral within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCandidate {
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub z_score: f64,
    pub stage_reached: CandidateStage,
}

impl AnomalyCandidate {
    pub fn primary(tag_id: &str, timestamp: DateTime<Utc>, value: f64, z_score: f64) -> Self {
        Self {
            tag_id: tag_id.to_string(),
            timestamp,
            value,
            z_score,
            stage_reached: CandidateStage::Primary,
        }
    }

    #[must_use]
    pub fn advance(mut self, event: StageEvent) -> Self {
        self.stage_reached = self.stage_reached.apply(event);
        self
    }

    pub fn stage(&self) -> Option<DetectionStage> {
        self.stage_reached.reached()
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self.stage_reached, CandidateStage::Dropped { .. })
    }
}

/// Operator-facing urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// 0 = most urgent
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Downstream renderers usually show only these.
    pub fn is_actionable(self) -> bool {
        !matches!(self, Self::Low)
    }

    pub fn plot_multiplier(self) -> f64 {
        match self {
            Self::Critical => 1000.0,
            Self::High => 100.0,
            Self::Medium => 10.0,
            Self::Low => 1.0,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Anomaly counts by age bucket. Buckets are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyBreakdown {
    pub last_24h: usize,
    pub last_7d: usize,
    pub last_30d: usize,
    pub older: usize,
}

impl RecencyBreakdown {
    pub fn total(&self) -> usize {
        self.last_24h + self.last_7d + self.last_30d + self.older
    }
}

/// Recency-weighted severity for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagPriority {
    pub weighted_score: f64,
    pub recency_breakdown: RecencyBreakdown,
    pub priority: Priority,
}

impl TagPriority {
    /// Ordering key for plotting: CRITICAL tags first, then by weighted score.
    pub fn plot_rank(&self) -> f64 {
        self.weighted_score * self.priority.plot_multiplier()
    }
}

/// Categorical detection confidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Medium,
    #[default]
    Low,
}

impl ConfidenceLevel {
    /// Cut points at 80, 60 and 40 points.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::VeryHigh
        } else if score >= 60.0 {
            Self::High
        } else if score >= 40.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryHigh => write!(f, "VERY_HIGH"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Points contributed by each detection layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub sigma: f64,
    pub mtd: f64,
    pub isolation: f64,
}

impl ConfidenceBreakdown {
    pub fn total(&self) -> f64 {
        self.sigma + self.mtd + self.isolation
    }
}

/// Per-tag detection confidence on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub score: f64,
    pub level: ConfidenceLevel,
    pub breakdown: ConfidenceBreakdown,
}

impl ConfidenceScore {
    pub fn from_breakdown(breakdown: ConfidenceBreakdown) -> Self {
        let score = breakdown.total();
        Self {
            score,
            level: ConfidenceLevel::from_score(score),
            breakdown,
        }
    }
}

/// Verified anomaly as emitted to reporting. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub tag_id: String,
    pub unit_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub detection_stage: DetectionStage,
    pub z_score: f64,
    pub mtd_tau: f64,
    pub mtd_tau_critical: f64,
    /// Isolation score; `None` when the ensemble stage degraded
    pub if_score: Option<f64>,
    pub weighted_score: f64,
    pub recency_breakdown: RecencyBreakdown,
    pub priority: Priority,
    /// Confidence of the tag the record belongs to
    pub confidence: ConfidenceScore,
}

impl AnomalyRecord {
    /// Build a record from a candidate that passed at least the MTD stage.
    pub fn from_candidate(
        candidate: &AnomalyCandidate,
        unit_id: &str,
        tag_priority: &TagPriority,
        confidence: ConfidenceScore,
    ) -> Option<Self> {
        let (detection_stage, mtd_tau, mtd_tau_critical, if_score) =
            match candidate.stage_reached {
                CandidateStage::MtdVerified { tau, tau_critical } => {
                    (DetectionStage::PrimaryMtd, tau, tau_critical, None)
                }
                CandidateStage::IfVerified {
                    tau,
                    tau_critical,
                    if_score,
                } => (DetectionStage::PrimaryMtdIf, tau, tau_critical, Some(if_score)),
                CandidateStage::Primary | CandidateStage::Dropped { .. } => return None,
            };

        Some(Self {
            tag_id: candidate.tag_id.clone(),
            unit_id: unit_id.to_string(),
            timestamp: candidate.timestamp,
            value: candidate.value,
            detection_stage,
            z_score: candidate.z_score,
            mtd_tau,
            mtd_tau_critical,
            if_score,
            weighted_score: tag_priority.weighted_score,
            recency_breakdown: tag_priority.recency_breakdown,
            priority: tag_priority.priority,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate() -> AnomalyCandidate {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AnomalyCandidate::primary("TI-100", ts, 65.0, 14.8)
    }

    #[test]
    fn test_stage_machine_moves_forward_only() {
        let c = candidate()
            .advance(StageEvent::MtdConfirmed {
                tau: 9.0,
                tau_critical: 1.5,
            })
            .advance(StageEvent::IfConfirmed { if_score: 0.71 });
        assert_eq!(c.stage(), Some(DetectionStage::PrimaryMtdIf));

        // A late MTD event cannot rewind an IF-verified candidate
        let c = c.advance(StageEvent::MtdRejected {
            reason: DropReason::BelowTauCritical,
        });
        assert_eq!(c.stage(), Some(DetectionStage::PrimaryMtdIf));
    }

    #[test]
    fn test_dropped_candidate_stays_dropped() {
        let c = candidate()
            .advance(StageEvent::MtdRejected {
                reason: DropReason::BelowTauCritical,
            })
            .advance(StageEvent::MtdConfirmed {
                tau: 9.0,
                tau_critical: 1.5,
            });
        assert!(c.is_dropped());
        assert_eq!(c.stage(), None);
    }

    #[test]
    fn test_if_event_skipping_mtd_is_ignored() {
        let c = candidate().advance(StageEvent::IfConfirmed { if_score: 0.8 });
        assert_eq!(c.stage(), Some(DetectionStage::Primary));
    }

    #[test]
    fn test_record_requires_mtd_stage() {
        let tp = TagPriority {
            weighted_score: 1.0,
            recency_breakdown: RecencyBreakdown::default(),
            priority: Priority::Low,
        };
        assert!(AnomalyRecord::from_candidate(&candidate(), "K-31-01", &tp, ConfidenceScore::default())
            .is_none());

        let verified = candidate().advance(StageEvent::MtdConfirmed {
            tau: 4.0,
            tau_critical: 1.4,
        });
        let confidence = ConfidenceScore::from_breakdown(ConfidenceBreakdown {
            sigma: 4.0,
            mtd: 2.0,
            isolation: 0.0,
        });
        let record = AnomalyRecord::from_candidate(&verified, "K-31-01", &tp, confidence).unwrap();
        assert_eq!(record.detection_stage, DetectionStage::PrimaryMtd);
        assert_eq!(record.if_score, None);
        assert_eq!(record.mtd_tau_critical, 1.4);
        assert_eq!(record.confidence.score, 6.0);
        assert_eq!(record.confidence.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_confidence_level_cut_points() {
        assert_eq!(ConfidenceLevel::from_score(85.0), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(80.0), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(79.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(60.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(40.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(39.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::default(), ConfidenceLevel::Low);
        let json = serde_json::to_string(&ConfidenceLevel::VeryHigh).unwrap();
        assert_eq!(json, "\"VERY_HIGH\"");
    }

    #[test]
    fn test_stage_serializes_with_plus_names() {
        let json = serde_json::to_string(&DetectionStage::PrimaryMtdIf).unwrap();
        assert_eq!(json, "\"primary+mtd+if\"");
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }
}
