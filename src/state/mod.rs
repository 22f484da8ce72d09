//! State Classifier: labels each timestamp of a unit as running or stopped
//!
//! Stopped periods make tag distributions bimodal and wreck sigma thresholds,
//! so every detection and calibration run first restricts each tag to the
//! rows where the unit was actually operating.
//!
//! Running is inferred from speed/flow proxy tags, picked out of the unit's
//! tag list by an ordered, declarative rule set resolved once per unit.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ProxyRuleConfig, RunningThreshold, StateConfig};
use crate::types::{OperatingState, StateBasis, UnitTable};

/// What a proxy tag measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyKind {
    Speed,
    Flow,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid proxy pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// ============================================================================
// Proxy Rules
// ============================================================================

#[derive(Debug, Clone)]
struct ProxyRule {
    pattern: Regex,
    kind: ProxyKind,
}

/// Ordered {pattern, kind} rules. The first matching rule decides a tag.
#[derive(Debug, Clone)]
pub struct ProxyRuleSet {
    rules: Vec<ProxyRule>,
}

/// A tag selected as a running-state proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProxy {
    pub tag_id: String,
    pub kind: ProxyKind,
    /// Index of the rule that matched; lower resolves first
    pub rule_index: usize,
}

impl ProxyRuleSet {
    pub fn from_config(rules: &[ProxyRuleConfig]) -> Result<Self, StateError> {
        let rules = rules
            .iter()
            .map(|r| {
                RegexBuilder::new(&r.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|pattern| ProxyRule {
                        pattern,
                        kind: r.kind,
                    })
                    .map_err(|source| StateError::InvalidPattern {
                        pattern: r.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Kind and rule index of the first rule matching `tag_id`.
    pub fn classify(&self, tag_id: &str) -> Option<(ProxyKind, usize)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, r)| r.pattern.is_match(tag_id))
            .map(|(i, r)| (r.kind, i))
    }

    /// Proxy tags among `tags`, ordered by rule index then tag id.
    pub fn resolve<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> Vec<ResolvedProxy> {
        let mut proxies: Vec<ResolvedProxy> = tags
            .into_iter()
            .filter_map(|tag| {
                self.classify(tag).map(|(kind, rule_index)| ResolvedProxy {
                    tag_id: tag.to_string(),
                    kind,
                    rule_index,
                })
            })
            .collect();
        proxies.sort_by(|a, b| {
            a.rule_index
                .cmp(&b.rule_index)
                .then_with(|| a.tag_id.cmp(&b.tag_id))
        });
        proxies
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Outcome of classifying one unit, kept for run reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub basis: StateBasis,
    pub proxies: Vec<String>,
    pub rows: usize,
    pub running_rows: usize,
}

impl StateSummary {
    pub fn of(state: &OperatingState, proxies: &[ResolvedProxy]) -> Self {
        Self {
            basis: state.basis(),
            proxies: proxies.iter().map(|p| p.tag_id.clone()).collect(),
            rows: state.len(),
            running_rows: state.running_count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateClassifier {
    rules: ProxyRuleSet,
    threshold: RunningThreshold,
    min_running_fraction: f64,
}

impl StateClassifier {
    pub fn new(config: &StateConfig) -> Result<Self, StateError> {
        Ok(Self {
            rules: ProxyRuleSet::from_config(&config.proxy_rules)?,
            threshold: config.running_threshold,
            min_running_fraction: config.min_running_fraction,
        })
    }

    pub fn rules(&self) -> &ProxyRuleSet {
        &self.rules
    }

    /// Proxy tags present in the table, in resolution order.
    pub fn proxies(&self, table: &UnitTable) -> Vec<ResolvedProxy> {
        self.rules.resolve(table.tags())
    }

    /// Label every timestamp of `table`. Never fails: without usable proxies
    /// the whole table is treated as running.
    pub fn classify(&self, table: &UnitTable) -> OperatingState {
        let proxies = self.proxies(table);
        self.classify_with(table, &proxies)
    }

    /// As [`classify`](Self::classify) with proxies already resolved.
    pub fn classify_with(&self, table: &UnitTable, proxies: &[ResolvedProxy]) -> OperatingState {
        let timestamps = table.timestamps().to_vec();
        let unit = table.unit_id();

        let columns: Vec<(&[Option<f64>], f64)> = proxies
            .iter()
            .filter_map(|p| table.column(&p.tag_id))
            .filter_map(|col| self.threshold_for(col).map(|thr| (col, thr)))
            .collect();

        if columns.is_empty() {
            warn!(unit = %unit, "No running-state proxy tag, treating all rows as running");
            return OperatingState::all_running(timestamps, StateBasis::NoProxy);
        }

        let running: Vec<bool> = (0..timestamps.len())
            .map(|row| {
                let mut any_reading = false;
                for (col, thr) in &columns {
                    if let Some(v) = col[row].filter(|v| v.is_finite()) {
                        any_reading = true;
                        if v > *thr {
                            return true;
                        }
                    }
                }
                // No proxy reading at this timestamp: unknown never blocks
                !any_reading
            })
            .collect();

        let state = OperatingState::new(timestamps, running, StateBasis::Proxy);
        let fraction = state.running_fraction();
        if fraction < self.min_running_fraction {
            warn!(
                unit = %unit,
                running_fraction = fraction,
                min_running_fraction = self.min_running_fraction,
                "Running fraction implausibly low (proxy miswired?), treating all rows as running"
            );
            return OperatingState::all_running(
                state.timestamps().to_vec(),
                StateBasis::LowRunningFraction,
            );
        }

        debug!(
            unit = %unit,
            proxies = columns.len(),
            running = state.running_count(),
            rows = state.len(),
            "Operating state classified"
        );
        state
    }

    /// Running threshold for one proxy column; `None` when the column has no
    /// finite readings.
    fn threshold_for(&self, column: &[Option<f64>]) -> Option<f64> {
        match self.threshold {
            RunningThreshold::Fixed { value } => Some(value),
            RunningThreshold::RangeFraction { fraction } => {
                let (min, max) = column
                    .iter()
                    .flatten()
                    .filter(|v| v.is_finite())
                    .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
                        None => Some((v, v)),
                        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    })?;
                Some(min + fraction * (max - min))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SeriesPoint, TagSeries};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn series(tag: &str, values: &[f64]) -> TagSeries {
        TagSeries::new(
            tag,
            "K-31-01",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint::new(ts(i as i64), *v))
                .collect(),
        )
        .unwrap()
    }

    fn classifier() -> StateClassifier {
        StateClassifier::new(&StateConfig::default()).unwrap()
    }

    #[test]
    fn test_default_rules_pick_speed_and_flow_tags() {
        let rules = classifier().rules;
        assert_eq!(rules.classify("31SI-1001").map(|c| c.0), Some(ProxyKind::Speed));
        assert_eq!(rules.classify("K31_SIA_200").map(|c| c.0), Some(ProxyKind::Speed));
        assert_eq!(rules.classify("turbine_rpm").map(|c| c.0), Some(ProxyKind::Speed));
        assert_eq!(rules.classify("FI-3002").map(|c| c.0), Some(ProxyKind::Flow));
        assert_eq!(rules.classify("FEED_FLOW").map(|c| c.0), Some(ProxyKind::Flow));
        assert_eq!(rules.classify("TI-100"), None);
        assert_eq!(rules.classify("PSI-200"), None);
    }

    #[test]
    fn test_resolve_orders_by_rule_then_name() {
        let rules = classifier().rules;
        let proxies = rules.resolve(["FI-2", "SI-9", "TI-1", "MAIN_SPEED", "FI-1"]);
        let ids: Vec<&str> = proxies.iter().map(|p| p.tag_id.as_str()).collect();
        assert_eq!(ids, vec!["MAIN_SPEED", "SI-9", "FI-1", "FI-2"]);
    }

    #[test]
    fn test_no_proxy_means_all_running() {
        let table = UnitTable::align("U", &[series("TI-1", &[1.0, 2.0, 3.0])]);
        let state = classifier().classify(&table);
        assert_eq!(state.basis(), StateBasis::NoProxy);
        assert_eq!(state.running_count(), 3);
    }

    #[test]
    fn test_fixed_threshold_labels_rows() {
        let speed = series("SI-1", &[0.0, 0.5, 1.0, 1.5, 3000.0]);
        let table = UnitTable::align("U", &[speed]);
        let mut config = StateConfig::default();
        config.min_running_fraction = 0.0;
        let state = StateClassifier::new(&config).unwrap().classify(&table);
        assert_eq!(state.flags(), &[false, false, false, true, true]);
        assert_eq!(state.basis(), StateBasis::Proxy);
    }

    #[test]
    fn test_any_proxy_above_threshold_counts() {
        let speed = series("SI-1", &[0.0, 0.0, 0.0, 0.0]);
        let flow = series("FI-1", &[0.0, 5.0, 0.0, 5.0]);
        let table = UnitTable::align("U", &[speed, flow]);
        let state = classifier().classify(&table);
        assert_eq!(state.flags(), &[false, true, false, true]);
    }

    #[test]
    fn test_range_fraction_threshold() {
        let speed = series("SI-1", &[100.0, 105.0, 200.0, 1100.0]);
        let table = UnitTable::align("U", &[speed]);
        let mut config = StateConfig::default();
        config.running_threshold = RunningThreshold::RangeFraction { fraction: 0.1 };
        // threshold = 100 + 0.1 * 1000 = 200, strictly above
        let state = StateClassifier::new(&config).unwrap().classify(&table);
        assert_eq!(state.flags(), &[false, false, false, true]);
    }

    #[test]
    fn test_missing_proxy_reading_counts_as_running() {
        let speed = TagSeries::new(
            "SI-1",
            "U",
            vec![SeriesPoint::new(ts(0), 0.0), SeriesPoint::new(ts(2), 0.0)],
        )
        .unwrap();
        let temp = series("TI-1", &[50.0, 50.0, 50.0]);
        let table = UnitTable::align("U", &[speed, temp]);
        let mut config = StateConfig::default();
        config.min_running_fraction = 0.0;
        let state = StateClassifier::new(&config).unwrap().classify(&table);
        assert_eq!(state.flags(), &[false, true, false]);
    }

    #[test]
    fn test_low_running_fraction_falls_back() {
        let mut values = vec![0.0; 100];
        values[0] = 10.0;
        let table = UnitTable::align("U", &[series("SI-1", &values)]);
        let state = classifier().classify(&table);
        assert_eq!(state.basis(), StateBasis::LowRunningFraction);
        assert_eq!(state.running_count(), 100);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut config = StateConfig::default();
        config.proxy_rules = vec![ProxyRuleConfig {
            pattern: "(".to_string(),
            kind: ProxyKind::Speed,
        }];
        assert!(matches!(
            StateClassifier::new(&config),
            Err(StateError::InvalidPattern { .. })
        ));
    }
}
