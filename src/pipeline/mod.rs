//! Detection pipeline: candidate detector, two verification stages and the
//! orchestrator that sequences them per tag and unit.
//!
//! Stage-local failures are never errors. Each one becomes a [`Degradation`]
//! on the tag's report and the tag continues with whatever the previous
//! stage produced.

pub mod isolation;
pub mod mtd;
pub mod primary;

mod coordinator;

pub use coordinator::{
    AnomalyPipeline, CancellationFlag, DetectError, DetectionRun, DetectionWindow, StageCounts,
    TagReport, UnitRequest,
};

use serde::{Deserialize, Serialize};

/// A recorded, non-fatal shortfall in one stage for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Not enough samples for the named stage; the tag is skipped there.
    InsufficientData {
        stage: String,
        available: usize,
        required: usize,
    },
    /// Zero-variance data handled locally by the named stage.
    DegenerateStatistics { stage: String, detail: String },
    /// Isolation stage could not train; survivors stay at `primary+mtd`.
    ModelTrainingFailure { reason: String },
    /// No calibrated profile, detector used window statistics.
    ConfigurationMissing,
    /// Profile store lookup failed; treated like a missing profile.
    ProfileUnavailable { error: String },
    /// Series source could not supply this tag.
    SeriesUnavailable { error: String },
    /// Non-finite samples removed before detection.
    QualityRejected { rejected: usize, reason: String },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData {
                stage,
                available,
                required,
            } => write!(f, "{stage}: {available} samples, need {required}"),
            Self::DegenerateStatistics { stage, detail } => write!(f, "{stage}: {detail}"),
            Self::ModelTrainingFailure { reason } => write!(f, "isolation: {reason}"),
            Self::ConfigurationMissing => write!(f, "primary: no baseline profile"),
            Self::ProfileUnavailable { error } => write!(f, "profile store: {error}"),
            Self::SeriesUnavailable { error } => write!(f, "series source: {error}"),
            Self::QualityRejected { rejected, reason } => {
                write!(f, "quality filter: {rejected} samples rejected ({reason})")
            }
        }
    }
}
