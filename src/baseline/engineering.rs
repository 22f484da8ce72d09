//! Tag type inference and engineering limits per instrument type.
//!
//! Types come from ISA-style instrument codes in the tag name (`TI`, `PIA`,
//! `FE`, ...) or from spelled-out keywords. Rules are evaluated in order and
//! the first match wins, so a tag carrying both `TI` and `FLOW` is a
//! temperature.

use regex::Regex;

use super::BaselineError;
use crate::baseline::stats::RunningStats;
use crate::types::TagType;

const TYPE_RULES: [(TagType, &str); 7] = [
    (TagType::Temperature, r"(^|[^A-Z])T[IE]A?([^A-Z]|$)|TEMP"),
    (TagType::Pressure, r"(^|[^A-Z])P[IE]A?([^A-Z]|$)|PRESS"),
    (TagType::Flow, r"(^|[^A-Z])F[IE]A?([^A-Z]|$)|FLOW"),
    (TagType::Level, r"(^|[^A-Z])L[IE]A?([^A-Z]|$)|LEVEL"),
    (TagType::Speed, r"(^|[^A-Z])SIA?([^A-Z]|$)|SPEED|RPM"),
    (TagType::Vibration, r"(^|[^A-Z])XIA?([^A-Z]|$)|VIB"),
    (TagType::Position, r"(^|[^A-Z])ZIA?([^A-Z]|$)|VALVE|POS"),
];

/// Ordered instrument-code rules. Tag names are upper-cased before matching.
#[derive(Debug, Clone)]
pub struct TagTypeRules {
    rules: Vec<(TagType, Regex)>,
}

impl TagTypeRules {
    pub fn new() -> Result<Self, BaselineError> {
        let rules = TYPE_RULES
            .iter()
            .map(|(tag_type, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*tag_type, re))
                    .map_err(|e| BaselineError::InvalidPattern(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn classify(&self, tag_id: &str) -> TagType {
        let upper = tag_id.to_uppercase();
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(&upper))
            .map(|(tag_type, _)| *tag_type)
            .unwrap_or(TagType::Unknown)
    }
}

/// Physical bounds of the instrument type plus the "reasonable" band derived
/// from the observed data range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineeringLimits {
    pub min_physical: Option<f64>,
    pub max_physical: Option<f64>,
    pub min_reasonable: f64,
    pub max_reasonable: f64,
}

impl EngineeringLimits {
    /// Limits for `tag_type` given the observed min/max of the history.
    pub fn for_type(tag_type: TagType, observed: &RunningStats) -> Self {
        let (lo, hi) = (observed.min_value, observed.max_value);
        let range = observed.range();

        match tag_type {
            // Celsius
            TagType::Temperature => Self {
                min_physical: Some(-273.0),
                max_physical: Some(2000.0),
                min_reasonable: (lo - 0.5 * range).max(-50.0),
                max_reasonable: (hi + 0.5 * range).min(500.0),
            },
            TagType::Pressure => Self {
                min_physical: Some(0.0),
                max_physical: Some(1000.0),
                min_reasonable: (lo - 0.3 * range).max(0.0),
                max_reasonable: (hi + 0.5 * range).min(200.0),
            },
            TagType::Flow => Self {
                min_physical: Some(0.0),
                max_physical: Some(50_000.0),
                min_reasonable: (lo - 0.2 * range).max(0.0),
                max_reasonable: hi + 0.8 * range,
            },
            // Percent of span
            TagType::Level => Self {
                min_physical: Some(0.0),
                max_physical: Some(100.0),
                min_reasonable: (lo - 5.0).max(0.0),
                max_reasonable: (hi + 5.0).min(100.0),
            },
            TagType::Speed => Self {
                min_physical: Some(0.0),
                max_physical: Some(20_000.0),
                min_reasonable: (lo - 0.3 * range).max(0.0),
                max_reasonable: hi + 0.5 * range,
            },
            TagType::Vibration | TagType::Position | TagType::Unknown => Self {
                min_physical: None,
                max_physical: None,
                min_reasonable: lo - 0.5 * range,
                max_reasonable: hi + 0.5 * range,
            },
        }
    }

    /// No engineering constraint at all.
    pub fn unbounded() -> Self {
        Self {
            min_physical: None,
            max_physical: None,
            min_reasonable: f64::NEG_INFINITY,
            max_reasonable: f64::INFINITY,
        }
    }

    /// True when `[lower, upper]` lies inside the physical bounds.
    pub fn contains(&self, lower: f64, upper: f64) -> bool {
        self.min_physical.map_or(true, |min| lower >= min)
            && self.max_physical.map_or(true, |max| upper <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_codes() {
        let rules = TagTypeRules::new().unwrap();
        assert_eq!(rules.classify("K31_TI_4410.PV"), TagType::Temperature);
        assert_eq!(rules.classify("PCM.TIA4410"), TagType::Temperature);
        assert_eq!(rules.classify("pi-2201"), TagType::Pressure);
        assert_eq!(rules.classify("FE1203"), TagType::Flow);
        assert_eq!(rules.classify("LI-07"), TagType::Level);
        assert_eq!(rules.classify("SI-100"), TagType::Speed);
        assert_eq!(rules.classify("K31_RPM"), TagType::Speed);
        assert_eq!(rules.classify("XI_1001A"), TagType::Vibration);
        assert_eq!(rules.classify("VALVE_POS_3"), TagType::Position);
        assert_eq!(rules.classify("COMP_EFF"), TagType::Unknown);
    }

    #[test]
    fn test_code_inside_word_does_not_match() {
        let rules = TagTypeRules::new().unwrap();
        // "PIPE" contains PI but not as an instrument code
        assert_eq!(rules.classify("PIPE_HEADER"), TagType::Unknown);
    }

    #[test]
    fn test_first_rule_wins() {
        let rules = TagTypeRules::new().unwrap();
        assert_eq!(rules.classify("TI_FLOW_OUT"), TagType::Temperature);
    }

    #[test]
    fn test_temperature_reasonable_band_is_capped() {
        let observed = RunningStats::from_values(&[100.0, 400.0]);
        let limits = EngineeringLimits::for_type(TagType::Temperature, &observed);
        assert_eq!(limits.min_reasonable, -50.0);
        assert_eq!(limits.max_reasonable, 500.0);
        assert!(limits.contains(-10.0, 450.0));
        assert!(!limits.contains(-300.0, 450.0));
    }

    #[test]
    fn test_level_band_uses_fixed_margin() {
        let observed = RunningStats::from_values(&[40.0, 60.0]);
        let limits = EngineeringLimits::for_type(TagType::Level, &observed);
        assert_eq!(limits.min_reasonable, 35.0);
        assert_eq!(limits.max_reasonable, 65.0);
    }

    #[test]
    fn test_unknown_type_has_no_physical_bounds() {
        let observed = RunningStats::from_values(&[-5.0, 5.0]);
        let limits = EngineeringLimits::for_type(TagType::Unknown, &observed);
        assert!(limits.contains(-1e9, 1e9));
        assert_eq!(limits.min_reasonable, -10.0);
    }
}
