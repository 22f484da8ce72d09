//! Detection Configuration Module
//!
//! Pipeline and calibration thresholds loaded from TOML, with every value
//! defaulting to the production setting.
//!
//! ## Loading Order
//!
//! 1. `TURBOWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `turbowatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded `DetectionConfig` is handed to `AnomalyPipeline::new` and the
//! `Calibrator`; there is no process-wide config instance.

mod detection_config;
pub mod defaults;
pub mod validation;

pub use detection_config::*;
