//! Per-timestamp operating state (running / stopped) for one unit run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TagSeries;

/// Why the classifier produced the labels it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBasis {
    /// Labels derived from proxy tag readings.
    Proxy,
    /// No speed/flow proxy tag in the unit; everything treated as running.
    NoProxy,
    /// Too few running rows (likely miswired proxy); everything treated as running.
    LowRunningFraction,
}

/// Boolean running flag aligned to the unit table's timestamps.
///
/// Derived per unit per run and never persisted. Timestamps not present in
/// the table are treated as running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingState {
    timestamps: Vec<DateTime<Utc>>,
    running: Vec<bool>,
    basis: StateBasis,
}

impl OperatingState {
    /// Labels from the classifier. `timestamps` must be sorted and the same
    /// length as `running`.
    pub fn new(timestamps: Vec<DateTime<Utc>>, running: Vec<bool>, basis: StateBasis) -> Self {
        debug_assert_eq!(timestamps.len(), running.len());
        Self {
            timestamps,
            running,
            basis,
        }
    }

    pub fn all_running(timestamps: Vec<DateTime<Utc>>, basis: StateBasis) -> Self {
        let running = vec![true; timestamps.len()];
        Self {
            timestamps,
            running,
            basis,
        }
    }

    pub fn basis(&self) -> StateBasis {
        self.basis
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn flags(&self) -> &[bool] {
        &self.running
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.iter().filter(|r| **r).count()
    }

    /// Fraction of labelled timestamps that are running (1.0 for an empty state).
    pub fn running_fraction(&self) -> f64 {
        if self.running.is_empty() {
            1.0
        } else {
            self.running_count() as f64 / self.running.len() as f64
        }
    }

    pub fn is_running_at(&self, timestamp: DateTime<Utc>) -> bool {
        match self.timestamps.binary_search(&timestamp) {
            Ok(i) => self.running[i],
            Err(_) => true,
        }
    }

    /// Restrict a series to its running-state points.
    pub fn running_subset(&self, series: &TagSeries) -> TagSeries {
        if self.running.iter().all(|r| *r) {
            return series.clone();
        }
        series.filtered(|p| self.is_running_at(p.timestamp))
    }
}
