//! ML Engine for tag anomaly verification
//!
//! Numerical building blocks behind the isolation verification stage and the
//! input hygiene applied before every stage.
//!
//! ## Architecture
//! - `quality_filter`: drops non-finite readings before any statistics
//! - `features`: value/lag/diff/rolling feature rows, standardization
//! - `isolation_forest`: seeded isolation forest and contamination threshold

pub mod features;
pub mod isolation_forest;
pub mod quality_filter;

pub use features::{FeatureMatrix, FeatureRow, FEATURE_COUNT, FEATURE_NAMES};
pub use isolation_forest::{outlier_threshold, ForestParams, IsolationError, IsolationForest};
pub use quality_filter::{FilterResult, SampleQualityFilter};
