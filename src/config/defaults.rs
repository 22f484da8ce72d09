//! System-wide default constants.
//!
//! Values that are not operator-tunable, or that seed the serde defaults in
//! `detection_config.rs`. Grouped by subsystem for easy discovery.

// ============================================================================
// Configuration
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TURBOWATCH_CONFIG";

/// Config file searched for in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "turbowatch.toml";

// ============================================================================
// State Classifier
// ============================================================================

/// Proxy reading above which equipment is considered running.
pub const RUNNING_PROXY_THRESHOLD: f64 = 1.0;

/// Share of a proxy's observed range used when no fixed threshold is configured.
pub const RUNNING_RANGE_FRACTION: f64 = 0.1;

// ============================================================================
// Candidate Detector
// ============================================================================

/// Sigma multiplier used when no calibrated profile exists.
pub const DEFAULT_SIGMA: f64 = 2.5;

/// Running samples required before a tag is evaluated at all.
pub const MIN_DETECTION_SAMPLES: usize = 10;

// ============================================================================
// Isolation Ensemble
// ============================================================================

/// Euler-Mascheroni constant, used by the average path length estimate.
pub const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fixed RNG seed so repeated runs produce identical records.
pub const ISOLATION_SEED: u64 = 42;

// ============================================================================
// Baseline Calibrator
// ============================================================================

/// Minimum history length for a calibration run.
pub const MIN_CALIBRATION_SAMPLES: usize = 100;

/// Sigma multiplier assigned to very stable processes.
pub const VERY_STABLE_SIGMA: f64 = 4.0;

/// IQR fence factor for stable processes; others use the standard 1.5.
pub const STABLE_IQR_FACTOR: f64 = 2.0;
pub const DEFAULT_IQR_FACTOR: f64 = 1.5;

// ============================================================================
// Profile Store
// ============================================================================

/// Schema version of persisted profile records. Bump on breaking changes;
/// records with another version read as missing and force recalibration.
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Key prefix for profile records in the sled tree.
pub const PROFILE_KEY_PREFIX: &str = "profile:";
