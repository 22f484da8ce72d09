//! ProfileStore / SeriesSource traits: the pipeline's only I/O seams
//!
//! Both are injected into the orchestrator so stages never touch storage
//! directly:
//! - `InMemoryProfileStore`: per-tag `Arc` swap, for tests and one-shot runs
//! - `SledProfileStore` (sibling module): durable, versioned records
//! - `InMemorySeriesSource`: pre-loaded series, for tests and the CSV driver

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::{BaselineProfile, SeriesPoint, TagSeries};

/// Read-shared by concurrent detection runs, written by the calibrator.
///
/// `put_profile` must replace the whole record so readers never observe a
/// partial profile.
pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, tag_id: &str) -> Result<Option<Arc<BaselineProfile>>, StoreError>;

    fn put_profile(&self, tag_id: &str, profile: &BaselineProfile) -> Result<(), StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Supplier of ordered tag samples for a time window (inclusive on both ends).
pub trait SeriesSource: Send + Sync {
    fn get_series(
        &self,
        tag_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TagSeries, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unknown tag: {0}")]
    UnknownTag(String),
    #[error("series source unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// In-memory profile store
// ============================================================================

/// Not durable; data is lost on drop.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Arc<BaselineProfile>>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get_profile(&self, tag_id: &str) -> Result<Option<Arc<BaselineProfile>>, StoreError> {
        let profiles = self.profiles.read().map_err(|_| StoreError::Poisoned)?;
        Ok(profiles.get(tag_id).cloned())
    }

    fn put_profile(&self, tag_id: &str, profile: &BaselineProfile) -> Result<(), StoreError> {
        let replacement = Arc::new(profile.clone());
        let mut profiles = self.profiles.write().map_err(|_| StoreError::Poisoned)?;
        profiles.insert(tag_id.to_string(), replacement);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

// ============================================================================
// In-memory series source
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct InMemorySeriesSource {
    series: HashMap<String, TagSeries>,
}

impl InMemorySeriesSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any series already held for the same tag.
    pub fn insert(&mut self, series: TagSeries) {
        self.series.insert(series.tag_id().to_string(), series);
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// (tag, unit) pairs for every held series.
    pub fn tag_units(&self) -> impl Iterator<Item = (&str, &str)> {
        self.series.values().map(|s| (s.tag_id(), s.unit_id()))
    }

    /// Tags belonging to `unit_id`, sorted.
    pub fn tags_for_unit(&self, unit_id: &str) -> Vec<String> {
        let mut tags: Vec<String> = self
            .series
            .values()
            .filter(|s| s.unit_id() == unit_id)
            .map(|s| s.tag_id().to_string())
            .collect();
        tags.sort();
        tags
    }

    /// First and last timestamp across every held series.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.series.values().filter_map(TagSeries::first_timestamp).min()?;
        let end = self.series.values().filter_map(TagSeries::last_timestamp).max()?;
        Some((start, end))
    }
}

impl FromIterator<TagSeries> for InMemorySeriesSource {
    fn from_iter<I: IntoIterator<Item = TagSeries>>(iter: I) -> Self {
        let mut source = Self::new();
        for series in iter {
            source.insert(series);
        }
        source
    }
}

impl SeriesSource for InMemorySeriesSource {
    fn get_series(
        &self,
        tag_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TagSeries, SourceError> {
        let series = self
            .series
            .get(tag_id)
            .ok_or_else(|| SourceError::UnknownTag(tag_id.to_string()))?;
        let points: Vec<SeriesPoint> = series.between(start, end).to_vec();
        TagSeries::new(series.tag_id(), series.unit_id(), points)
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    }
}
