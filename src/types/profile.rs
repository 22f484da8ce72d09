//! Calibrated per-tag baseline profile and its classification enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process stability class derived from the coefficient of variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityClass {
    VeryStable,
    Stable,
    ModeratelyStable,
    Variable,
}

impl StabilityClass {
    pub const ALL: [Self; 4] = [
        Self::VeryStable,
        Self::Stable,
        Self::ModeratelyStable,
        Self::Variable,
    ];
}

impl std::fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryStable => write!(f, "very_stable"),
            Self::Stable => write!(f, "stable"),
            Self::ModeratelyStable => write!(f, "moderately_stable"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// Sensor data quality verdict. Low-quality tags are flagged, never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Good,
    /// Value unchanged across too large a share of samples.
    Stuck,
    /// Sample-to-sample noise or spread implausible for a process signal.
    Noisy,
}

impl QualityFlag {
    pub fn is_low_quality(self) -> bool {
        !matches!(self, Self::Good)
    }
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => write!(f, "GOOD"),
            Self::Stuck => write!(f, "STUCK"),
            Self::Noisy => write!(f, "NOISY"),
        }
    }
}

/// Instrument type inferred from the tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Temperature,
    Pressure,
    Flow,
    Level,
    Speed,
    Vibration,
    Position,
    Unknown,
}

impl std::fmt::Display for TagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Temperature => "TEMPERATURE",
            Self::Pressure => "PRESSURE",
            Self::Flow => "FLOW",
            Self::Level => "LEVEL",
            Self::Speed => "SPEED",
            Self::Vibration => "VIBRATION",
            Self::Position => "POSITION",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Recommended detector sensitivity for the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// Fewer false positives; stable process with a clean history.
    Low,
    Medium,
    /// More responsive, more false positives.
    High,
}

/// Per-tag thresholds and quality verdict from long-horizon calibration.
///
/// Created or fully replaced by the calibrator; read-only to detection.
/// `lower_limit <= mean <= upper_limit` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub tag_id: String,
    pub tag_type: TagType,
    pub stability_class: StabilityClass,
    pub mean: f64,
    pub std: f64,
    /// Coefficient of variation (std / |mean|)
    pub cv: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub sigma_multiplier: f64,
    pub quality_flag: QualityFlag,
    /// Longest run of unchanged values as a fraction of the sample count
    pub stuck_fraction: f64,
    /// std(first differences) / std(values)
    pub noise_ratio: f64,
    /// Physical bounds for the tag type, when known
    pub engineering_min: Option<f64>,
    pub engineering_max: Option<f64>,
    /// False when the statistical limits fall outside the physical bounds
    pub limits_plausible: bool,
    /// Share of calibration samples outside the final limits
    pub historical_outlier_rate: f64,
    pub sensitivity: Sensitivity,
    pub sample_count: usize,
    pub calibrated_at: DateTime<Utc>,
}

impl BaselineProfile {
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std > 0.0 {
            (value - self.mean) / self.std
        } else {
            0.0
        }
    }

    pub fn within_limits(&self, value: f64) -> bool {
        value >= self.lower_limit && value <= self.upper_limit
    }
}
