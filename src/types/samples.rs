//! Tag samples, ordered per-tag series and the aligned per-unit tag table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// A single archived reading as produced by the acquisition layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSample {
    pub tag_id: String,
    pub unit_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Timestamp/value pair inside a [`TagSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Series {tag} is out of order at index {index}")]
    OutOfOrder { tag: String, index: usize },

    #[error("Sample for tag {found} cannot join series {expected}")]
    MixedTags { expected: String, found: String },
}

/// Ordered readings for one tag. Timestamps are non-decreasing; gaps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSeries {
    tag_id: String,
    unit_id: String,
    points: Vec<SeriesPoint>,
}

impl TagSeries {
    /// Build a series, rejecting out-of-order points.
    pub fn new(
        tag_id: impl Into<String>,
        unit_id: impl Into<String>,
        points: Vec<SeriesPoint>,
    ) -> Result<Self, SeriesError> {
        let tag_id = tag_id.into();
        if let Some(index) = points
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(SeriesError::OutOfOrder {
                tag: tag_id,
                index: index + 1,
            });
        }
        Ok(Self {
            tag_id,
            unit_id: unit_id.into(),
            points,
        })
    }

    /// Build a series from points in arbitrary order (stable sort by timestamp).
    pub fn from_unsorted(
        tag_id: impl Into<String>,
        unit_id: impl Into<String>,
        mut points: Vec<SeriesPoint>,
    ) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self {
            tag_id: tag_id.into(),
            unit_id: unit_id.into(),
            points,
        }
    }

    /// Build a series from externally produced samples of a single tag.
    pub fn from_samples(
        tag_id: &str,
        unit_id: &str,
        samples: impl IntoIterator<Item = TagSample>,
    ) -> Result<Self, SeriesError> {
        let mut points = Vec::new();
        for sample in samples {
            if sample.tag_id != tag_id {
                return Err(SeriesError::MixedTags {
                    expected: tag_id.to_string(),
                    found: sample.tag_id,
                });
            }
            points.push(SeriesPoint::new(sample.timestamp, sample.value));
        }
        Self::new(tag_id, unit_id, points)
    }

    pub fn tag_id(&self) -> &str {
        &self.tag_id
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Keep only the points matching `keep`; order is preserved so the result
    /// is still a valid series.
    pub fn filtered(&self, keep: impl Fn(&SeriesPoint) -> bool) -> Self {
        Self {
            tag_id: self.tag_id.clone(),
            unit_id: self.unit_id.clone(),
            points: self.points.iter().copied().filter(|p| keep(p)).collect(),
        }
    }

    /// Points with `start <= timestamp <= end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[SeriesPoint] {
        let lo = self.points.partition_point(|p| p.timestamp < start);
        let hi = self.points.partition_point(|p| p.timestamp <= end);
        if lo >= hi {
            &[]
        } else {
            &self.points[lo..hi]
        }
    }
}

/// Union-of-timestamps view over all tags of one unit.
///
/// Each column holds `None` where the tag has no reading at that timestamp.
/// Duplicate timestamps within one series keep the last reading.
#[derive(Debug, Clone, Default)]
pub struct UnitTable {
    unit_id: String,
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl UnitTable {
    pub fn align(unit_id: &str, series: &[TagSeries]) -> Self {
        let timestamps: Vec<DateTime<Utc>> = series
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.timestamp))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let index: HashMap<DateTime<Utc>, usize> = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| (*ts, i))
            .collect();

        let mut columns = BTreeMap::new();
        for s in series {
            let mut column = vec![None; timestamps.len()];
            for p in s.points() {
                if let Some(&i) = index.get(&p.timestamp) {
                    column[i] = Some(p.value);
                }
            }
            columns.insert(s.tag_id().to_string(), column);
        }

        Self {
            unit_id: unit_id.to_string(),
            timestamps,
            columns,
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn column(&self, tag_id: &str) -> Option<&[Option<f64>]> {
        self.columns.get(tag_id).map(Vec::as_slice)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
