//! Priority Scorer: recency-weighted severity per tag.
//!
//! Every verified anomaly contributes `e^(-ln2 / half_life * age_days)` to
//! the tag's weighted score, so an anomaly from today counts 1.0, one from a
//! half-life ago 0.5. Priority then favours anything inside the critical
//! window, followed by dense or heavily weighted recent activity.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::config::PriorityConfig;
use crate::types::{Priority, RecencyBreakdown, TagPriority};

const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct PriorityScorer<'a> {
    config: &'a PriorityConfig,
    as_of: DateTime<Utc>,
}

impl<'a> PriorityScorer<'a> {
    /// Ages are measured back from `as_of`; anomalies after it count as age 0.
    pub fn new(config: &'a PriorityConfig, as_of: DateTime<Utc>) -> Self {
        Self { config, as_of }
    }

    fn age_days(&self, timestamp: DateTime<Utc>) -> f64 {
        let seconds = (self.as_of - timestamp).num_milliseconds() as f64 / 1000.0;
        (seconds / SECONDS_PER_DAY).max(0.0)
    }

    pub fn weighted_score(&self, timestamps: &BTreeSet<DateTime<Utc>>) -> f64 {
        let decay = std::f64::consts::LN_2 / self.config.half_life_days;
        timestamps
            .iter()
            .map(|ts| (-decay * self.age_days(*ts)).exp())
            .sum()
    }

    pub fn recency_breakdown(&self, timestamps: &BTreeSet<DateTime<Utc>>) -> RecencyBreakdown {
        let critical_days = self.config.critical_window_hours / 24.0;
        let mut breakdown = RecencyBreakdown::default();
        for ts in timestamps {
            let age = self.age_days(*ts);
            if age <= critical_days {
                breakdown.last_24h += 1;
            } else if age <= self.config.high_window_days {
                breakdown.last_7d += 1;
            } else if age <= self.config.medium_window_days {
                breakdown.last_30d += 1;
            } else {
                breakdown.older += 1;
            }
        }
        breakdown
    }

    pub fn classify(&self, breakdown: &RecencyBreakdown, weighted_score: f64) -> Priority {
        let c = self.config;
        if breakdown.last_24h > 0 {
            Priority::Critical
        } else if breakdown.last_7d > c.high_window_count || weighted_score > c.high_score {
            Priority::High
        } else if breakdown.last_30d > c.medium_window_count || weighted_score > c.medium_score {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Score one tag's verified anomaly timestamps. Repeated timestamps count once.
    pub fn score<I>(&self, timestamps: I) -> TagPriority
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let unique: BTreeSet<DateTime<Utc>> = timestamps.into_iter().collect();
        let weighted_score = self.weighted_score(&unique);
        let recency_breakdown = self.recency_breakdown(&unique);
        TagPriority {
            weighted_score,
            recency_breakdown,
            priority: self.classify(&recency_breakdown, weighted_score),
        }
    }
}
