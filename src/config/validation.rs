//! Config validation: unknown-key detection with Levenshtein suggestions
//! and typical-range checks.
//!
//! The raw TOML is first parsed into a `toml::Value` and its key tree compared
//! against the known field names; typos produce warnings with "did you mean?"
//! suggestions. Serde deserialization runs afterwards. Warnings never reject a
//! config.

use std::collections::HashSet;

use super::DetectionConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Valid dotted key paths for `DetectionConfig`.
///
/// Maintained by hand to match detection_config.rs. Array-of-table entries
/// (`state.proxy_rules`) are not walked, so only the array key itself appears.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [state]
        "state",
        "state.min_running_fraction",
        "state.proxy_rules",
        "state.running_threshold",
        "state.running_threshold.mode",
        "state.running_threshold.value",
        "state.running_threshold.fraction",
        // [primary]
        "primary",
        "primary.base_sigma",
        "primary.min_samples",
        "primary.high_cv",
        "primary.high_cv_delta",
        "primary.low_cv",
        "primary.low_cv_delta",
        "primary.min_sigma",
        "primary.max_sigma",
        // [mtd]
        "mtd",
        "mtd.window_minutes",
        "mtd.min_window_samples",
        "mtd.small_window_max",
        "mtd.medium_window_max",
        "mtd.tau_critical_small",
        "mtd.tau_critical_medium",
        "mtd.tau_critical_large",
        // [isolation]
        "isolation",
        "isolation.enabled",
        "isolation.n_trees",
        "isolation.max_samples",
        "isolation.contamination_cap",
        "isolation.rolling_window",
        "isolation.min_training_samples",
        "isolation.seed",
        // [priority]
        "priority",
        "priority.half_life_days",
        "priority.critical_window_hours",
        "priority.high_window_days",
        "priority.medium_window_days",
        "priority.high_window_count",
        "priority.high_score",
        "priority.medium_window_count",
        "priority.medium_score",
        // [calibration]
        "calibration",
        "calibration.min_samples",
        "calibration.very_stable_cv",
        "calibration.stable_cv",
        "calibration.moderately_stable_cv",
        "calibration.very_stable_sigma",
        "calibration.default_sigma",
        "calibration.stuck_tolerance",
        "calibration.max_stuck_fraction",
        "calibration.max_noise_ratio",
        "calibration.max_plausible_cv",
        "calibration.max_historical_outlier_rate",
        "calibration.relax_factor",
        "calibration.engineering_limits",
        "calibration.low_sensitivity_max_rate",
        "calibration.medium_sensitivity_max_rate",
        // [pipeline]
        "pipeline",
        "pipeline.parallel_tags",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect all dotted key paths of a `toml::Value` table tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let Some(table) = value.as_table() else {
        return Vec::new();
    };

    let mut keys = Vec::new();
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        if v.is_table() {
            keys.extend(walk_toml_keys(v, &path));
        }
        keys.push(path);
    }
    keys
}

// ============================================================================
// Suggestions
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3. Ties go to the alphabetically
/// first key so suggestions are stable across runs.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Parse raw TOML and return a warning for every unknown key.
///
/// Unparseable input yields no warnings; serde reports it afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Typical Range Checks
// ============================================================================

/// Flag values that validate but are unusual enough to be a likely mistake.
pub fn check_typical_ranges(config: &DetectionConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn_if = |cond: bool, field: &str, message: String| {
        if cond {
            warnings.push(ValidationWarning {
                field: field.to_string(),
                message,
                suggestion: None,
            });
        }
    };

    let p = &config.primary;
    warn_if(
        !(1.5..=4.0).contains(&p.base_sigma),
        "primary.base_sigma",
        format!("base_sigma = {:.2} is outside the typical range (1.5-4.0)", p.base_sigma),
    );

    let pr = &config.priority;
    warn_if(
        pr.half_life_days > 90.0,
        "priority.half_life_days",
        format!(
            "half_life_days = {:.1} makes months-old anomalies rank like current ones",
            pr.half_life_days
        ),
    );

    let m = &config.mtd;
    warn_if(
        m.window_minutes > 24 * 60,
        "mtd.window_minutes",
        format!(
            "window_minutes = {} exceeds one day; MTD is meant as a local test",
            m.window_minutes
        ),
    );

    let c = &config.calibration;
    warn_if(
        c.min_samples < 30,
        "calibration.min_samples",
        format!(
            "min_samples = {} is too short a history for stable quartiles",
            c.min_samples
        ),
    );

    warn_if(
        config.state.proxy_rules.is_empty(),
        "state.proxy_rules",
        "no proxy rules configured; every unit will be treated as always running".to_string(),
    );

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("sigma", "sigma"), 0);
        assert_eq!(levenshtein("half_lfe_days", "half_life_days"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [state.running_threshold]
            mode = "fixed"
            value = 2.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"state".to_string()));
        assert!(keys.contains(&"state.running_threshold".to_string()));
        assert!(keys.contains(&"state.running_threshold.value".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[priority]
half_lfe_days = 3.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "priority.half_lfe_days");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("priority.half_life_days")
        );
    }

    #[test]
    fn test_unrelated_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("[dashboard]\ntheme = \"dark\"\n");
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
    }

    #[test]
    fn test_default_config_keys_are_all_known() {
        let toml_str = DetectionConfig::default().to_toml().unwrap();
        let warnings = validate_unknown_keys(&toml_str);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_invalid_toml_yields_no_warnings() {
        assert!(validate_unknown_keys("[[[ not toml").is_empty());
    }

    #[test]
    fn test_typical_ranges_quiet_for_defaults() {
        assert!(check_typical_ranges(&DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_typical_ranges_flags_long_half_life() {
        let mut config = DetectionConfig::default();
        config.priority.half_life_days = 365.0;
        let warnings = check_typical_ranges(&config);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "priority.half_life_days");
    }
}
