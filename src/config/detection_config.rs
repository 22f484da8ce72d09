//! Detection Configuration - every pipeline threshold as an operator-tunable TOML value
//!
//! Each section implements `Default` with the production values, so a run with
//! no config file behaves exactly like a run with an empty one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::state::ProxyKind;

/// One year. Longer MTD windows overflow timestamp arithmetic.
const MAX_MTD_WINDOW_MINUTES: i64 = 366 * 24 * 60;

// Comparisons below are false for NaN, so a NaN setting fails validation.

fn is_positive(x: f64) -> bool {
    x > 0.0
}

fn is_ordered(lo: f64, hi: f64) -> bool {
    lo <= hi
}

fn is_strictly_ordered(lo: f64, hi: f64) -> bool {
    lo < hi
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the anomaly pipeline and the calibrator.
///
/// Load with `DetectionConfig::load()` which searches:
/// 1. `$TURBOWATCH_CONFIG` env var
/// 2. `./turbowatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Running/stopped classification
    #[serde(default)]
    pub state: StateConfig,

    /// Adaptive sigma candidate detection
    #[serde(default)]
    pub primary: PrimaryConfig,

    /// Modified Thompson Tau verification
    #[serde(default)]
    pub mtd: MtdConfig,

    /// Isolation ensemble verification
    #[serde(default)]
    pub isolation: IsolationConfig,

    /// Recency-weighted priority scoring
    #[serde(default)]
    pub priority: PriorityConfig,

    /// Offline baseline calibration
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Scheduling of tags inside one unit run
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl DetectionConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TURBOWATCH_CONFIG` environment variable
    /// 2. `./turbowatch.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded detection config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded detection config from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", defaults::LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::ParseStr(inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::ParseStr)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Detection config saved");
        Ok(())
    }

    /// Validate all thresholds for internal consistency.
    ///
    /// Rules:
    /// - Sigma bounds must be positive and ordered
    /// - MTD window must be positive and at most one year
    /// - Tau critical values must increase with window size
    /// - Contamination cap must lie in (0, 0.5]
    /// - Priority windows must be ordered 24h < high < medium
    /// - CV breaks must be strictly increasing
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // State
        match self.state.running_threshold {
            RunningThreshold::Fixed { value } if !value.is_finite() => {
                errors.push("state.running_threshold.value must be finite".to_string());
            }
            RunningThreshold::RangeFraction { fraction } if !(0.0..=1.0).contains(&fraction) => {
                errors.push(format!(
                    "state.running_threshold.fraction ({fraction:.3}) must be within [0, 1]"
                ));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&self.state.min_running_fraction) {
            errors.push(format!(
                "state.min_running_fraction ({:.3}) must be within [0, 1]",
                self.state.min_running_fraction
            ));
        }
        for rule in &self.state.proxy_rules {
            if let Err(e) = regex::Regex::new(&rule.pattern) {
                errors.push(format!("state.proxy_rules: invalid pattern '{}': {e}", rule.pattern));
            }
        }

        // Primary
        let p = &self.primary;
        if !is_positive(p.min_sigma) {
            errors.push("primary.min_sigma must be > 0".to_string());
        }
        if !is_ordered(p.min_sigma, p.max_sigma) {
            errors.push(format!(
                "primary.min_sigma ({:.2}) must be <= max_sigma ({:.2})",
                p.min_sigma, p.max_sigma
            ));
        }
        if !is_positive(p.base_sigma) {
            errors.push("primary.base_sigma must be > 0".to_string());
        }
        if !is_strictly_ordered(p.low_cv, p.high_cv) {
            errors.push(format!(
                "primary.low_cv ({:.3}) must be < high_cv ({:.3})",
                p.low_cv, p.high_cv
            ));
        }
        if p.min_samples < 2 {
            errors.push("primary.min_samples must be >= 2".to_string());
        }

        // MTD
        let m = &self.mtd;
        if m.window_minutes <= 0 || m.window_minutes > MAX_MTD_WINDOW_MINUTES {
            errors.push(format!(
                "mtd.window_minutes ({}) must be within 1..={MAX_MTD_WINDOW_MINUTES}",
                m.window_minutes
            ));
        }
        if m.small_window_max >= m.medium_window_max {
            errors.push(format!(
                "mtd.small_window_max ({}) must be < medium_window_max ({})",
                m.small_window_max, m.medium_window_max
            ));
        }
        if !(m.tau_critical_small <= m.tau_critical_medium
            && m.tau_critical_medium <= m.tau_critical_large)
        {
            errors.push("mtd tau critical values must not decrease with window size".to_string());
        }

        // Isolation
        let iso = &self.isolation;
        if iso.n_trees == 0 {
            errors.push("isolation.n_trees must be > 0".to_string());
        }
        if iso.max_samples < 2 {
            errors.push("isolation.max_samples must be >= 2".to_string());
        }
        if !(iso.contamination_cap > 0.0 && iso.contamination_cap <= 0.5) {
            errors.push(format!(
                "isolation.contamination_cap ({:.3}) must be within (0, 0.5]",
                iso.contamination_cap
            ));
        }
        if iso.rolling_window == 0 {
            errors.push("isolation.rolling_window must be > 0".to_string());
        }

        // Priority
        let pr = &self.priority;
        if !is_positive(pr.half_life_days) {
            errors.push("priority.half_life_days must be > 0".to_string());
        }
        if !is_ordered(pr.critical_window_hours / 24.0, pr.high_window_days) {
            errors.push("priority.critical_window_hours must not exceed high_window_days".to_string());
        }
        if !is_ordered(pr.high_window_days, pr.medium_window_days) {
            errors.push(format!(
                "priority.high_window_days ({:.1}) must be <= medium_window_days ({:.1})",
                pr.high_window_days, pr.medium_window_days
            ));
        }
        if !is_ordered(pr.medium_score, pr.high_score) {
            errors.push(format!(
                "priority.medium_score ({:.1}) must be <= high_score ({:.1})",
                pr.medium_score, pr.high_score
            ));
        }

        // Calibration
        let c = &self.calibration;
        if !(c.very_stable_cv < c.stable_cv && c.stable_cv < c.moderately_stable_cv) {
            errors.push("calibration CV breaks must be strictly increasing".to_string());
        }
        if c.min_samples < 2 {
            errors.push("calibration.min_samples must be >= 2".to_string());
        }
        if !(is_positive(c.very_stable_sigma) && is_positive(c.default_sigma)) {
            errors.push("calibration sigma multipliers must be > 0".to_string());
        }
        if !is_ordered(1.0, c.relax_factor) {
            errors.push(format!(
                "calibration.relax_factor ({:.2}) must be >= 1.0",
                c.relax_factor
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config parse error: {0}")]
    ParseStr(toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// State Classifier
// ============================================================================

/// How the running threshold for a proxy tag is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunningThreshold {
    /// Running when any proxy reads strictly above `value`.
    Fixed { value: f64 },
    /// Running when a proxy reads above `min + fraction * (max - min)` of its
    /// own observed range.
    RangeFraction { fraction: f64 },
}

impl Default for RunningThreshold {
    fn default() -> Self {
        Self::Fixed {
            value: defaults::RUNNING_PROXY_THRESHOLD,
        }
    }
}

/// One entry in the ordered proxy rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRuleConfig {
    /// Case-insensitive regex matched against the tag id
    pub pattern: String,
    pub kind: ProxyKind,
}

impl ProxyRuleConfig {
    fn new(pattern: &str, kind: ProxyKind) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Below this share of running rows the proxy is distrusted (miswiring)
    /// and every row is treated as running.
    #[serde(default = "default_min_running_fraction")]
    pub min_running_fraction: f64,

    #[serde(default)]
    pub running_threshold: RunningThreshold,

    /// Evaluated in order; the first matching rule decides a tag's kind.
    #[serde(default = "default_proxy_rules")]
    pub proxy_rules: Vec<ProxyRuleConfig>,
}

fn default_min_running_fraction() -> f64 { 0.05 }

fn default_proxy_rules() -> Vec<ProxyRuleConfig> {
    vec![
        ProxyRuleConfig::new("SPEED", ProxyKind::Speed),
        ProxyRuleConfig::new("RPM", ProxyKind::Speed),
        ProxyRuleConfig::new(r"(^|[^A-Z])S[IE]A?([^A-Z]|$)", ProxyKind::Speed),
        ProxyRuleConfig::new("FLOW", ProxyKind::Flow),
        ProxyRuleConfig::new(r"(^|[^A-Z])FIA?([^A-Z]|$)", ProxyKind::Flow),
    ]
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            running_threshold: RunningThreshold::default(),
            min_running_fraction: default_min_running_fraction(),
            proxy_rules: default_proxy_rules(),
        }
    }
}

// ============================================================================
// Candidate Detector
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryConfig {
    /// Sigma multiplier before proxy adjustment (when no profile exists)
    #[serde(default = "default_base_sigma")]
    pub base_sigma: f64,

    /// Running samples required to evaluate a tag
    #[serde(default = "default_primary_min_samples")]
    pub min_samples: usize,

    /// Proxy CV above which the process is considered highly variable
    #[serde(default = "default_high_cv")]
    pub high_cv: f64,

    /// Sigma adjustment applied for highly variable proxies
    #[serde(default = "default_high_cv_delta")]
    pub high_cv_delta: f64,

    /// Proxy CV below which the process is considered very steady
    #[serde(default = "default_low_cv")]
    pub low_cv: f64,

    /// Sigma adjustment applied for very steady proxies
    #[serde(default = "default_low_cv_delta")]
    pub low_cv_delta: f64,

    #[serde(default = "default_min_sigma")]
    pub min_sigma: f64,

    #[serde(default = "default_max_sigma")]
    pub max_sigma: f64,
}

fn default_base_sigma() -> f64 { defaults::DEFAULT_SIGMA }
fn default_primary_min_samples() -> usize { defaults::MIN_DETECTION_SAMPLES }
fn default_high_cv() -> f64 { 0.2 }
fn default_high_cv_delta() -> f64 { -0.3 }
fn default_low_cv() -> f64 { 0.05 }
fn default_low_cv_delta() -> f64 { 0.2 }
fn default_min_sigma() -> f64 { 1.5 }
fn default_max_sigma() -> f64 { 4.0 }

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            base_sigma: default_base_sigma(),
            min_samples: default_primary_min_samples(),
            high_cv: default_high_cv(),
            high_cv_delta: default_high_cv_delta(),
            low_cv: default_low_cv(),
            low_cv_delta: default_low_cv_delta(),
            min_sigma: default_min_sigma(),
            max_sigma: default_max_sigma(),
        }
    }
}

// ============================================================================
// MTD Verification
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtdConfig {
    /// Half-width of the local window around each candidate (minutes)
    #[serde(default = "default_mtd_window_minutes")]
    pub window_minutes: i64,

    /// Windows smaller than this widen to the full running series
    #[serde(default = "default_mtd_min_window_samples")]
    pub min_window_samples: usize,

    /// Largest window size using `tau_critical_small`
    #[serde(default = "default_small_window_max")]
    pub small_window_max: usize,

    /// Largest window size using `tau_critical_medium`
    #[serde(default = "default_medium_window_max")]
    pub medium_window_max: usize,

    #[serde(default = "default_tau_critical_small")]
    pub tau_critical_small: f64,

    #[serde(default = "default_tau_critical_medium")]
    pub tau_critical_medium: f64,

    #[serde(default = "default_tau_critical_large")]
    pub tau_critical_large: f64,
}

fn default_mtd_window_minutes() -> i64 { 60 }
fn default_mtd_min_window_samples() -> usize { 10 }
fn default_small_window_max() -> usize { 10 }
fn default_medium_window_max() -> usize { 50 }
fn default_tau_critical_small() -> f64 { 1.15 }
fn default_tau_critical_medium() -> f64 { 1.4 }
fn default_tau_critical_large() -> f64 { 1.5 }

impl Default for MtdConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_mtd_window_minutes(),
            min_window_samples: default_mtd_min_window_samples(),
            small_window_max: default_small_window_max(),
            medium_window_max: default_medium_window_max(),
            tau_critical_small: default_tau_critical_small(),
            tau_critical_medium: default_tau_critical_medium(),
            tau_critical_large: default_tau_critical_large(),
        }
    }
}

impl MtdConfig {
    /// Critical tau for a window of `n` samples.
    pub fn tau_critical(&self, n: usize) -> f64 {
        if n <= self.small_window_max {
            self.tau_critical_small
        } else if n <= self.medium_window_max {
            self.tau_critical_medium
        } else {
            self.tau_critical_large
        }
    }
}

// ============================================================================
// Isolation Ensemble
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Disable to stop after MTD (records stay at `primary+mtd`)
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Sub-sample size per tree
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Upper bound on the contamination fraction
    #[serde(default = "default_contamination_cap")]
    pub contamination_cap: f64,

    /// Window for the rolling mean/std features
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,

    /// Feature rows required to train a model
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_true() -> bool { true }
fn default_n_trees() -> usize { 100 }
fn default_max_samples() -> usize { 256 }
fn default_contamination_cap() -> f64 { 0.1 }
fn default_rolling_window() -> usize { 50 }
fn default_min_training_samples() -> usize { 30 }
fn default_seed() -> u64 { defaults::ISOLATION_SEED }

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trees: default_n_trees(),
            max_samples: default_max_samples(),
            contamination_cap: default_contamination_cap(),
            rolling_window: default_rolling_window(),
            min_training_samples: default_min_training_samples(),
            seed: default_seed(),
        }
    }
}

// ============================================================================
// Priority Scorer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Age at which an anomaly contributes half weight (days)
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,

    /// Any anomaly newer than this makes the tag CRITICAL (hours)
    #[serde(default = "default_critical_window_hours")]
    pub critical_window_hours: f64,

    #[serde(default = "default_high_window_days")]
    pub high_window_days: f64,

    #[serde(default = "default_medium_window_days")]
    pub medium_window_days: f64,

    /// HIGH when more than this many anomalies fall in the high window
    #[serde(default = "default_high_window_count")]
    pub high_window_count: usize,

    /// HIGH when the weighted score exceeds this
    #[serde(default = "default_high_score")]
    pub high_score: f64,

    /// MEDIUM when more than this many anomalies fall in the medium window
    #[serde(default = "default_medium_window_count")]
    pub medium_window_count: usize,

    /// MEDIUM when the weighted score exceeds this
    #[serde(default = "default_medium_score")]
    pub medium_score: f64,
}

fn default_half_life_days() -> f64 { 7.0 }
fn default_critical_window_hours() -> f64 { 24.0 }
fn default_high_window_days() -> f64 { 7.0 }
fn default_medium_window_days() -> f64 { 30.0 }
fn default_high_window_count() -> usize { 5 }
fn default_high_score() -> f64 { 10.0 }
fn default_medium_window_count() -> usize { 10 }
fn default_medium_score() -> f64 { 5.0 }

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
            critical_window_hours: default_critical_window_hours(),
            high_window_days: default_high_window_days(),
            medium_window_days: default_medium_window_days(),
            high_window_count: default_high_window_count(),
            high_score: default_high_score(),
            medium_window_count: default_medium_window_count(),
            medium_score: default_medium_score(),
        }
    }
}

// ============================================================================
// Baseline Calibrator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_calibration_min_samples")]
    pub min_samples: usize,

    /// CV below this is very stable
    #[serde(default = "default_very_stable_cv")]
    pub very_stable_cv: f64,

    #[serde(default = "default_stable_cv")]
    pub stable_cv: f64,

    #[serde(default = "default_moderately_stable_cv")]
    pub moderately_stable_cv: f64,

    #[serde(default = "default_very_stable_sigma")]
    pub very_stable_sigma: f64,

    /// Sigma for every other stability class
    #[serde(default = "default_calibration_sigma")]
    pub default_sigma: f64,

    /// Consecutive values closer than this count as unchanged
    #[serde(default = "default_stuck_tolerance")]
    pub stuck_tolerance: f64,

    #[serde(default = "default_max_stuck_fraction")]
    pub max_stuck_fraction: f64,

    #[serde(default = "default_max_noise_ratio")]
    pub max_noise_ratio: f64,

    /// CV above this is implausible for a process signal
    #[serde(default = "default_max_plausible_cv")]
    pub max_plausible_cv: f64,

    /// Relax limits when more history than this falls outside them
    #[serde(default = "default_max_historical_outlier_rate")]
    pub max_historical_outlier_rate: f64,

    #[serde(default = "default_relax_factor")]
    pub relax_factor: f64,

    /// Apply tag-type engineering limits
    #[serde(default = "default_true")]
    pub engineering_limits: bool,

    /// Historical outlier rate below which stable tags get low sensitivity
    #[serde(default = "default_low_sensitivity_max_rate")]
    pub low_sensitivity_max_rate: f64,

    /// Historical outlier rate below which moderately stable tags get medium sensitivity
    #[serde(default = "default_medium_sensitivity_max_rate")]
    pub medium_sensitivity_max_rate: f64,
}

fn default_calibration_min_samples() -> usize { defaults::MIN_CALIBRATION_SAMPLES }
fn default_very_stable_cv() -> f64 { 0.025 }
fn default_stable_cv() -> f64 { 0.05 }
fn default_moderately_stable_cv() -> f64 { 0.10 }
fn default_very_stable_sigma() -> f64 { defaults::VERY_STABLE_SIGMA }
fn default_calibration_sigma() -> f64 { defaults::DEFAULT_SIGMA }
fn default_stuck_tolerance() -> f64 { 0.001 }
fn default_max_stuck_fraction() -> f64 { 0.10 }
fn default_max_noise_ratio() -> f64 { 1.0 }
fn default_max_plausible_cv() -> f64 { 1.0 }
fn default_max_historical_outlier_rate() -> f64 { 0.05 }
fn default_relax_factor() -> f64 { 1.2 }
fn default_low_sensitivity_max_rate() -> f64 { 0.02 }
fn default_medium_sensitivity_max_rate() -> f64 { 0.03 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: default_calibration_min_samples(),
            very_stable_cv: default_very_stable_cv(),
            stable_cv: default_stable_cv(),
            moderately_stable_cv: default_moderately_stable_cv(),
            very_stable_sigma: default_very_stable_sigma(),
            default_sigma: default_calibration_sigma(),
            stuck_tolerance: default_stuck_tolerance(),
            max_stuck_fraction: default_max_stuck_fraction(),
            max_noise_ratio: default_max_noise_ratio(),
            max_plausible_cv: default_max_plausible_cv(),
            max_historical_outlier_rate: default_max_historical_outlier_rate(),
            relax_factor: default_relax_factor(),
            engineering_limits: true,
            low_sensitivity_max_rate: default_low_sensitivity_max_rate(),
            medium_sensitivity_max_rate: default_medium_sensitivity_max_rate(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run the tags of one unit on the rayon pool
    #[serde(default = "default_true")]
    pub parallel_tags: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { parallel_tags: true }
    }
}

// ============================================================================
// Tests
// ============================================================================
