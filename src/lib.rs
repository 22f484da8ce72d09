//! TurboWatch: anomaly detection for rotating-equipment sensor tags
//!
//! Batch pipeline over pulled archive windows that separates real process
//! excursions from shutdown artefacts and ordinary variability, then ranks
//! what survives by recency.
//!
//! ## Architecture
//!
//! - **State Classifier**: running/stopped rows from speed/flow proxy tags
//! - **Candidate Detector**: adaptive sigma flagging over running rows
//! - **MTD Verification**: local-window Modified Thompson Tau
//! - **Isolation Verification**: seeded isolation forest on shape features
//! - **Priority Scorer**: half-life weighted recency severity
//! - **Baseline Calibrator**: offline per-tag profiles and quality flags

pub mod baseline;
pub mod config;
pub mod ml_engine;
pub mod pipeline;
pub mod processing;
pub mod state;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, DetectionConfig};

// Re-export commonly used types
pub use types::{
    AnomalyCandidate, AnomalyRecord, BaselineProfile, ConfidenceLevel, ConfidenceScore,
    DetectionStage, OperatingState, Priority, QualityFlag, RecencyBreakdown, Sensitivity,
    StabilityClass, TagSample, TagSeries, TagType, UnitTable,
};

// Re-export pipeline entry points
pub use pipeline::{
    AnomalyPipeline, CancellationFlag, Degradation, DetectError, DetectionRun, DetectionWindow,
    TagReport, UnitRequest,
};

// Re-export calibration
pub use baseline::{BaselineError, CalibrationSummary, Calibrator, UnitCalibration};

// Re-export storage
pub use storage::{
    InMemoryProfileStore, InMemorySeriesSource, ProfileStore, SeriesSource, SledProfileStore,
};

// Re-export state classification
pub use state::{StateClassifier, StateSummary};
