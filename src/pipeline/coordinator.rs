//! Pipeline Orchestrator - per-unit detection sequence
//!
//! ```text
//! FETCH:     series for every requested tag (source failures recorded per tag)
//! FILTER:    non-finite readings dropped
//! STATE:     unit table aligned, running rows classified once per unit
//! PRIMARY:   adaptive sigma candidates over running rows
//! MTD:       local-window tau verification
//! ISOLATION: forest cross-check of MTD survivors (degrades, never fails)
//! PRIORITY:  recency-weighted score per tag, records emitted
//! ```
//!
//! Units are independent and may run in parallel. Tags within a unit are
//! independent too; stages within a tag are strictly sequential. Nothing
//! inside a stage does I/O: all series and profiles are fetched up front.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{isolation, mtd, primary, Degradation};
use crate::baseline::{BaselineError, CalibrationFailure, Calibrator, RunningStats, UnitCalibration};
use crate::config::{ConfigError, DetectionConfig};
use crate::ml_engine::SampleQualityFilter;
use crate::processing::{confidence_score, PriorityScorer};
use crate::state::{StateClassifier, StateError, StateSummary};
use crate::storage::{ProfileStore, SeriesSource};
use crate::types::{
    AnomalyCandidate, AnomalyRecord, BaselineProfile, ConfidenceScore, DetectionStage,
    OperatingState, Priority, TagSeries, UnitTable,
};

// ============================================================================
// Run Types
// ============================================================================

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid detection configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid state classifier configuration: {0}")]
    State(#[from] StateError),

    #[error("Calibrator setup failed: {0}")]
    Calibrator(#[from] BaselineError),

    #[error("Window start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("No series available for unit {unit_id}: {reason}")]
    NoSeries { unit_id: String, reason: String },
}

/// Inclusive analysis window. Priority ages are measured from `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DetectionWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of length `span` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, span: chrono::Duration) -> Self {
        Self {
            start: end - span,
            end,
        }
    }
}

/// Cooperative cancellation shared between a caller and running units.
///
/// Checked before each tag starts; a tag already in progress finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRequest {
    pub unit_id: String,
    pub tags: Vec<String>,
    pub window: DetectionWindow,
}

/// Survivors after each stage for one tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub primary: usize,
    pub mtd: usize,
    pub isolation: usize,
}

/// What happened to one tag during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReport {
    pub tag_id: String,
    /// Furthest stage any candidate reached, `None` when nothing was flagged
    pub stage_reached: Option<DetectionStage>,
    pub counts: StageCounts,
    pub degradations: Vec<Degradation>,
    pub priority: Option<Priority>,
    pub confidence: ConfidenceScore,
    /// Tag was never started because the run was cancelled first
    pub cancelled: bool,
}

impl TagReport {
    fn empty(tag_id: &str) -> Self {
        Self {
            tag_id: tag_id.to_string(),
            stage_reached: None,
            counts: StageCounts::default(),
            degradations: Vec::new(),
            priority: None,
            confidence: ConfidenceScore::default(),
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRun {
    pub unit_id: String,
    pub window: DetectionWindow,
    /// Sorted by priority, weighted score (desc), tag id, timestamp
    pub records: Vec<AnomalyRecord>,
    /// One per requested tag, in request order
    pub tag_reports: Vec<TagReport>,
    pub state: StateSummary,
}

impl DetectionRun {
    pub fn cancelled_tags(&self) -> impl Iterator<Item = &str> {
        self.tag_reports
            .iter()
            .filter(|r| r.cancelled)
            .map(|r| r.tag_id.as_str())
    }
}

/// A tag's input after fetching and filtering.
struct TagInput {
    report: TagReport,
    series: Option<TagSeries>,
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct AnomalyPipeline {
    config: DetectionConfig,
    classifier: StateClassifier,
    calibrator: Calibrator,
    series_source: Arc<dyn SeriesSource>,
    profile_store: Arc<dyn ProfileStore>,
}

impl AnomalyPipeline {
    pub fn new(
        config: DetectionConfig,
        series_source: Arc<dyn SeriesSource>,
        profile_store: Arc<dyn ProfileStore>,
    ) -> Result<Self, DetectError> {
        config.validate()?;
        let classifier = StateClassifier::new(&config.state)?;
        let calibrator = Calibrator::new(&config.calibration)?;
        info!(
            proxy_rules = classifier.rules().len(),
            profile_store = profile_store.backend_name(),
            isolation = config.isolation.enabled,
            "Anomaly pipeline initialized"
        );
        Ok(Self {
            config,
            classifier,
            calibrator,
            series_source,
            profile_store,
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Verified anomaly records for `tags` of `unit_id` over `window`.
    pub fn detect(
        &self,
        unit_id: &str,
        tags: &[String],
        window: DetectionWindow,
    ) -> Result<Vec<AnomalyRecord>, DetectError> {
        self.detect_with_report(unit_id, tags, window, &CancellationFlag::new())
            .map(|run| run.records)
    }

    /// Run every unit request; units execute in parallel and fail independently.
    pub fn detect_units(
        &self,
        requests: &[UnitRequest],
        cancel: &CancellationFlag,
    ) -> Vec<Result<DetectionRun, DetectError>> {
        requests
            .par_iter()
            .map(|r| self.detect_with_report(&r.unit_id, &r.tags, r.window, cancel))
            .collect()
    }

    /// As [`detect`](Self::detect), also returning per-tag reports and the
    /// unit's state summary. Fails only when no tag's series can be fetched.
    pub fn detect_with_report(
        &self,
        unit_id: &str,
        tags: &[String],
        window: DetectionWindow,
        cancel: &CancellationFlag,
    ) -> Result<DetectionRun, DetectError> {
        if window.start > window.end {
            return Err(DetectError::InvalidWindow {
                start: window.start,
                end: window.end,
            });
        }

        let mut seen = HashSet::new();
        let tags: Vec<&str> = tags
            .iter()
            .map(String::as_str)
            .filter(|t| seen.insert(*t))
            .collect();

        let inputs = self.fetch_inputs(unit_id, &tags, window)?;
        let fetched: Vec<TagSeries> = inputs.iter().filter_map(|i| i.series.clone()).collect();

        let table = UnitTable::align(unit_id, &fetched);
        let proxies = self.classifier.proxies(&table);
        let state = self.classifier.classify_with(&table, &proxies);
        let proxy_cv = proxies
            .first()
            .and_then(|p| fetched.iter().find(|s| s.tag_id() == p.tag_id))
            .and_then(|s| proxy_cv(&state, s));

        debug!(
            unit = %unit_id,
            rows = state.len(),
            running = state.running_count(),
            basis = ?state.basis(),
            proxy_cv = ?proxy_cv,
            "Operating state classified"
        );

        let run_one = |input: TagInput| -> (TagReport, Vec<AnomalyRecord>) {
            let TagInput { mut report, series } = input;
            if cancel.is_cancelled() {
                report.cancelled = true;
                return (report, Vec::new());
            }
            match series {
                Some(series) => self.run_tag(unit_id, &series, &state, proxy_cv, window, report),
                None => (report, Vec::new()),
            }
        };

        let outcomes: Vec<(TagReport, Vec<AnomalyRecord>)> = if self.config.pipeline.parallel_tags {
            inputs.into_par_iter().map(run_one).collect()
        } else {
            inputs.into_iter().map(run_one).collect()
        };

        let mut records = Vec::new();
        let mut tag_reports = Vec::with_capacity(outcomes.len());
        for (report, tag_records) in outcomes {
            records.extend(tag_records);
            tag_reports.push(report);
        }
        sort_records(&mut records);

        let run = DetectionRun {
            unit_id: unit_id.to_string(),
            window,
            records,
            tag_reports,
            state: StateSummary::of(&state, &proxies),
        };

        let cancelled = run.cancelled_tags().count();
        info!(
            unit = %unit_id,
            tags = run.tag_reports.len(),
            records = run.records.len(),
            cancelled,
            "Detection run complete"
        );
        Ok(run)
    }

    /// Fetch and quality-filter every tag. Errors only when nothing at all
    /// could be fetched for a non-empty tag list.
    fn fetch_inputs(
        &self,
        unit_id: &str,
        tags: &[&str],
        window: DetectionWindow,
    ) -> Result<Vec<TagInput>, DetectError> {
        let mut inputs = Vec::with_capacity(tags.len());
        let mut last_error = None;

        for tag in tags {
            let mut report = TagReport::empty(tag);
            let series = match self.series_source.get_series(tag, window.start, window.end) {
                Ok(series) => Some(series),
                Err(e) => {
                    warn!(unit = %unit_id, tag = %tag, error = %e, "Series unavailable");
                    report.degradations.push(Degradation::SeriesUnavailable {
                        error: e.to_string(),
                    });
                    last_error = Some(e.to_string());
                    None
                }
            };

            let series = series.and_then(|s| {
                let filtered = SampleQualityFilter::filter(&s);
                if filtered.rejected > 0 {
                    report.degradations.push(Degradation::QualityRejected {
                        rejected: filtered.rejected,
                        reason: filtered.rejection_reason.clone().unwrap_or_default(),
                    });
                }
                if filtered.all_rejected() {
                    report.degradations.push(Degradation::InsufficientData {
                        stage: "quality_filter".to_string(),
                        available: 0,
                        required: self.config.primary.min_samples,
                    });
                    return None;
                }
                Some(filtered.series)
            });

            inputs.push(TagInput { report, series });
        }

        let fetch_failures = inputs
            .iter()
            .filter(|i| {
                i.report
                    .degradations
                    .iter()
                    .any(|d| matches!(d, Degradation::SeriesUnavailable { .. }))
            })
            .count();
        if !tags.is_empty() && fetch_failures == tags.len() {
            return Err(DetectError::NoSeries {
                unit_id: unit_id.to_string(),
                reason: last_error.unwrap_or_default(),
            });
        }
        Ok(inputs)
    }

    fn lookup_profile(&self, tag_id: &str, report: &mut TagReport) -> Option<Arc<BaselineProfile>> {
        match self.profile_store.get_profile(tag_id) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(tag = %tag_id, error = %e, "Profile lookup failed, using window statistics");
                report.degradations.push(Degradation::ProfileUnavailable {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn run_tag(
        &self,
        unit_id: &str,
        series: &TagSeries,
        state: &OperatingState,
        proxy_cv: Option<f64>,
        window: DetectionWindow,
        mut report: TagReport,
    ) -> (TagReport, Vec<AnomalyRecord>) {
        let tag_id = series.tag_id();
        let profile = self.lookup_profile(tag_id, &mut report);
        let running = state.running_subset(series);

        let primary = primary::detect_candidates(
            &running,
            profile.as_deref(),
            proxy_cv,
            &self.config.primary,
        );
        report.degradations.extend(primary.degradations);
        report.counts.primary = primary.candidates.len();

        let mut candidates = mtd::verify(primary.candidates, &running, &self.config.mtd);
        report.counts.mtd = count_at_least(&candidates, DetectionStage::PrimaryMtd);

        if self.config.isolation.enabled {
            let verified = isolation::verify(candidates, &running, &self.config.isolation);
            report.degradations.extend(verified.degradation);
            candidates = verified.candidates;
        }
        report.counts.isolation = count_at_least(&candidates, DetectionStage::PrimaryMtdIf);
        report.stage_reached = candidates.iter().filter_map(AnomalyCandidate::stage).max();
        report.confidence = confidence_score(
            report.counts.primary,
            report.counts.mtd,
            report.counts.isolation,
        );

        let survivors: Vec<&AnomalyCandidate> = candidates
            .iter()
            .filter(|c| c.stage() >= Some(DetectionStage::PrimaryMtd))
            .collect();

        let scorer = PriorityScorer::new(&self.config.priority, window.end);
        let tag_priority = scorer.score(survivors.iter().map(|c| c.timestamp));
        let records: Vec<AnomalyRecord> = survivors
            .iter()
            .filter_map(|c| {
                AnomalyRecord::from_candidate(c, unit_id, &tag_priority, report.confidence)
            })
            .collect();
        if !records.is_empty() {
            report.priority = Some(tag_priority.priority);
        }

        for d in &report.degradations {
            warn!(unit = %unit_id, tag = %tag_id, degradation = %d, "Stage degraded");
        }
        debug!(
            unit = %unit_id,
            tag = %tag_id,
            running = running.len(),
            primary = report.counts.primary,
            mtd = report.counts.mtd,
            isolation = report.counts.isolation,
            confidence = report.confidence.score,
            records = records.len(),
            "Tag processed"
        );

        (report, records)
    }

    // ========================================================================
    // Calibration
    // ========================================================================

    /// Profile one tag over `long_window` and store it. The profile's
    /// `calibrated_at` is the window end, so reruns are reproducible.
    pub fn calibrate(
        &self,
        tag_id: &str,
        long_window: DetectionWindow,
    ) -> Result<BaselineProfile, BaselineError> {
        let series = self
            .series_source
            .get_series(tag_id, long_window.start, long_window.end)
            .map_err(|source| BaselineError::Source {
                tag: tag_id.to_string(),
                source,
            })?;
        let profile = self.calibrator.calibrate_series(&series, long_window.end)?;
        self.profile_store
            .put_profile(tag_id, &profile)
            .map_err(|source| BaselineError::Store {
                tag: tag_id.to_string(),
                source,
            })?;

        info!(
            tag = %tag_id,
            stability = %profile.stability_class,
            sigma = profile.sigma_multiplier,
            quality = %profile.quality_flag,
            samples = profile.sample_count,
            "Baseline calibrated"
        );
        Ok(profile)
    }

    /// Calibrate every tag of a unit over its running rows and store the
    /// profiles. Tags that cannot be fetched, profiled or stored are listed
    /// as failures in the summary.
    pub fn calibrate_unit(
        &self,
        unit_id: &str,
        tags: &[String],
        long_window: DetectionWindow,
    ) -> Result<UnitCalibration, DetectError> {
        let mut fetched = Vec::with_capacity(tags.len());
        let mut fetch_failures = Vec::new();
        for tag in tags {
            match self
                .series_source
                .get_series(tag, long_window.start, long_window.end)
            {
                Ok(series) => fetched.push(series),
                Err(e) => fetch_failures.push(CalibrationFailure {
                    tag_id: tag.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        if !tags.is_empty() && fetched.is_empty() {
            return Err(DetectError::NoSeries {
                unit_id: unit_id.to_string(),
                reason: fetch_failures
                    .last()
                    .map(|f| f.reason.clone())
                    .unwrap_or_default(),
            });
        }

        let mut calibration =
            self.calibrator
                .calibrate_unit(unit_id, &fetched, &self.classifier, long_window.end);

        let mut stored = Vec::with_capacity(calibration.profiles.len());
        for profile in calibration.profiles {
            match self.profile_store.put_profile(&profile.tag_id, &profile) {
                Ok(()) => stored.push(profile),
                Err(e) => {
                    warn!(unit = %unit_id, tag = %profile.tag_id, error = %e, "Profile not stored");
                    calibration.summary.failures.push(CalibrationFailure {
                        tag_id: profile.tag_id.clone(),
                        reason: e.to_string(),
                    });
                    if let Some(n) = calibration
                        .summary
                        .stability_distribution
                        .get_mut(&profile.stability_class)
                    {
                        *n = n.saturating_sub(1);
                    }
                }
            }
        }
        calibration.profiles = stored;
        calibration.summary.calibrated = calibration.profiles.len();
        calibration.summary.tags_total = tags.len();
        calibration.summary.failures.extend(fetch_failures);

        Ok(calibration)
    }
}

/// Coefficient of variation of the proxy over running rows. `None` when the
/// proxy has no running readings or a zero mean.
fn proxy_cv(state: &OperatingState, proxy: &TagSeries) -> Option<f64> {
    let stats = RunningStats::from_values(&state.running_subset(proxy).values());
    if stats.count == 0 || stats.mean == 0.0 {
        return None;
    }
    Some(stats.cv())
}

fn count_at_least(candidates: &[AnomalyCandidate], stage: DetectionStage) -> usize {
    candidates.iter().filter(|c| c.stage() >= Some(stage)).count()
}

fn sort_records(records: &mut [AnomalyRecord]) {
    records.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| b.weighted_score.total_cmp(&a.weighted_score))
            .then_with(|| a.tag_id.cmp(&b.tag_id))
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryProfileStore, InMemorySeriesSource, SourceError, StoreError};
    use crate::types::ConfidenceLevel;
    use crate::types::SeriesPoint;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn series(tag: &str, values: &[f64]) -> TagSeries {
        TagSeries::new(
            tag,
            "K-31-01",
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint::new(t0() + Duration::minutes(i as i64), *v))
                .collect(),
        )
        .unwrap()
    }

    fn spiked(n: usize, at: usize) -> Vec<f64> {
        let mut values: Vec<f64> = (0..n).map(|i| 50.0 + (i as f64 * 0.7).sin()).collect();
        values[at] = 65.0;
        values
    }

    fn pipeline(config: DetectionConfig, source: InMemorySeriesSource) -> AnomalyPipeline {
        AnomalyPipeline::new(config, Arc::new(source), Arc::new(InMemoryProfileStore::new()))
            .unwrap()
    }

    /// Forest disabled: the spike row and the row after it are equally
    /// isolated, so which one the forest confirms is not the point here.
    fn without_forest() -> DetectionConfig {
        let mut config = DetectionConfig::default();
        config.isolation.enabled = false;
        config
    }

    fn window(n: usize) -> DetectionWindow {
        DetectionWindow::new(t0(), t0() + Duration::minutes(n as i64 - 1))
    }

    struct FailingSource;

    impl SeriesSource for FailingSource {
        fn get_series(
            &self,
            _tag_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<TagSeries, SourceError> {
            Err(SourceError::Unavailable("archive offline".to_string()))
        }
    }

    /// Cancels the run the first time any profile is looked up, i.e. while
    /// the first tag is in progress.
    struct CancelOnLookup {
        cancel: CancellationFlag,
    }

    impl ProfileStore for CancelOnLookup {
        fn get_profile(&self, _tag_id: &str) -> Result<Option<Arc<BaselineProfile>>, StoreError> {
            self.cancel.cancel();
            Ok(None)
        }

        fn put_profile(&self, _tag_id: &str, _profile: &BaselineProfile) -> Result<(), StoreError> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "cancel-on-lookup"
        }
    }

    #[test]
    fn test_spike_becomes_critical_record() {
        let source: InMemorySeriesSource =
            std::iter::once(series("TI-100", &spiked(1000, 500))).collect();
        let p = pipeline(without_forest(), source);
        let records = p
            .detect("K-31-01", &["TI-100".to_string()], window(1000))
            .unwrap();

        let spike = records.iter().find(|r| r.value == 65.0).expect("spike recorded");
        assert_eq!(spike.detection_stage, DetectionStage::PrimaryMtd);
        assert!(spike.mtd_tau > spike.mtd_tau_critical);
        // The spike is 500 minutes before the window end
        assert_eq!(spike.priority, Priority::Critical);
        assert!(spike.weighted_score >= 0.0);
    }

    #[test]
    fn test_all_fetches_failing_is_an_error() {
        let p = AnomalyPipeline::new(
            DetectionConfig::default(),
            Arc::new(FailingSource),
            Arc::new(InMemoryProfileStore::new()),
        )
        .unwrap();
        let err = p
            .detect("K-31-01", &["TI-1".to_string()], window(10))
            .unwrap_err();
        assert!(matches!(err, DetectError::NoSeries { .. }));
    }

    #[test]
    fn test_partial_fetch_failure_is_a_degradation() {
        let source: InMemorySeriesSource =
            std::iter::once(series("TI-100", &spiked(300, 150))).collect();
        let p = pipeline(without_forest(), source);
        let run = p
            .detect_with_report(
                "K-31-01",
                &["TI-100".to_string(), "TI-404".to_string()],
                window(300),
                &CancellationFlag::new(),
            )
            .unwrap();
        assert_eq!(run.tag_reports.len(), 2);
        assert!(matches!(
            run.tag_reports[1].degradations[0],
            Degradation::SeriesUnavailable { .. }
        ));
        assert!(!run.records.is_empty());
    }

    #[test]
    fn test_cancelled_before_start_reports_every_tag() {
        let source: InMemorySeriesSource = vec![
            series("TI-100", &spiked(300, 150)),
            series("PI-200", &spiked(300, 100)),
        ]
        .into_iter()
        .collect();
        let p = pipeline(DetectionConfig::default(), source);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let run = p
            .detect_with_report(
                "K-31-01",
                &["TI-100".to_string(), "PI-200".to_string()],
                window(300),
                &cancel,
            )
            .unwrap();
        assert!(run.records.is_empty());
        assert_eq!(run.cancelled_tags().count(), 2);
    }

    #[test]
    fn test_cancel_mid_run_keeps_finished_tags() {
        let source: InMemorySeriesSource = vec![
            series("TI-1", &spiked(300, 150)),
            series("TI-2", &spiked(300, 100)),
        ]
        .into_iter()
        .collect();
        let mut config = without_forest();
        config.pipeline.parallel_tags = false;
        let cancel = CancellationFlag::new();
        let store = CancelOnLookup {
            cancel: cancel.clone(),
        };
        let p = AnomalyPipeline::new(config, Arc::new(source), Arc::new(store)).unwrap();

        let run = p
            .detect_with_report(
                "K-31-01",
                &["TI-1".to_string(), "TI-2".to_string()],
                window(300),
                &cancel,
            )
            .unwrap();

        assert_eq!(run.cancelled_tags().collect::<Vec<_>>(), vec!["TI-2"]);
        assert!(!run.tag_reports[0].cancelled);
        assert!(!run.records.is_empty());
        assert!(run.records.iter().all(|r| r.tag_id == "TI-1"));
        assert_eq!(run.tag_reports[1].counts, StageCounts::default());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = DetectionConfig::default();
        config.priority.half_life_days = f64::NAN;
        let err = AnomalyPipeline::new(
            config,
            Arc::new(InMemorySeriesSource::new()),
            Arc::new(InMemoryProfileStore::new()),
        )
        .err()
        .expect("NaN half-life must be rejected");
        assert!(matches!(err, DetectError::Config(ConfigError::Validation(_))));

        // Would overflow the MTD window arithmetic if accepted
        let mut config = DetectionConfig::default();
        config.mtd.window_minutes = i64::MAX / 1000;
        assert!(matches!(
            AnomalyPipeline::new(
                config,
                Arc::new(InMemorySeriesSource::new()),
                Arc::new(InMemoryProfileStore::new()),
            ),
            Err(DetectError::Config(_))
        ));
    }

    #[test]
    fn test_confidence_follows_stage_counts() {
        let source: InMemorySeriesSource =
            std::iter::once(series("TI-100", &spiked(1000, 500))).collect();
        let p = pipeline(without_forest(), source);
        let run = p
            .detect_with_report(
                "K-31-01",
                &["TI-100".to_string(), "TI-404".to_string()],
                window(1000),
                &CancellationFlag::new(),
            )
            .unwrap();

        let report = &run.tag_reports[0];
        let counts = report.counts;
        assert!(counts.mtd >= 1);
        assert_eq!(counts.isolation, 0);
        assert_eq!(
            report.confidence,
            confidence_score(counts.primary, counts.mtd, 0)
        );
        assert_eq!(report.confidence.breakdown.isolation, 0.0);
        assert!(run.records.iter().all(|r| r.confidence == report.confidence));

        // Unfetched tag never earns points
        assert_eq!(run.tag_reports[1].confidence.score, 0.0);
        assert_eq!(run.tag_reports[1].confidence.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let p = pipeline(DetectionConfig::default(), InMemorySeriesSource::new());
        let err = p
            .detect(
                "K-31-01",
                &["TI-1".to_string()],
                DetectionWindow::new(t0(), t0() - Duration::hours(1)),
            )
            .unwrap_err();
        assert!(matches!(err, DetectError::InvalidWindow { .. }));
    }

    #[test]
    fn test_non_finite_samples_reported() {
        let mut values = spiked(300, 150);
        values[10] = f64::NAN;
        let source: InMemorySeriesSource = std::iter::once(series("TI-100", &values)).collect();
        let p = pipeline(DetectionConfig::default(), source);
        let run = p
            .detect_with_report("K-31-01", &["TI-100".to_string()], window(300), &CancellationFlag::new())
            .unwrap();
        assert!(run.tag_reports[0]
            .degradations
            .iter()
            .any(|d| matches!(d, Degradation::QualityRejected { rejected: 1, .. })));
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let source: InMemorySeriesSource = vec![
            series("TI-100", &spiked(600, 200)),
            series("PI-200", &spiked(600, 450)),
        ]
        .into_iter()
        .collect();
        let tags = vec!["TI-100".to_string(), "PI-200".to_string()];

        let parallel = pipeline(DetectionConfig::default(), source.clone())
            .detect("K-31-01", &tags, window(600))
            .unwrap();
        let mut config = DetectionConfig::default();
        config.pipeline.parallel_tags = false;
        let sequential = pipeline(config, source)
            .detect("K-31-01", &tags, window(600))
            .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_calibrate_stores_profile() {
        let values: Vec<f64> = (0..500).map(|i| 80.0 + (i as f64 * 0.05).sin()).collect();
        let source: InMemorySeriesSource = std::iter::once(series("TI-100", &values)).collect();
        let store = Arc::new(InMemoryProfileStore::new());
        let p = AnomalyPipeline::new(DetectionConfig::default(), Arc::new(source), store.clone())
            .unwrap();

        let profile = p.calibrate("TI-100", window(500)).unwrap();
        assert_eq!(profile.calibrated_at, window(500).end);
        assert_eq!(
            store.get_profile("TI-100").unwrap().as_deref(),
            Some(&profile)
        );
        assert!(matches!(
            p.calibrate("TI-999", window(500)),
            Err(BaselineError::Source { .. })
        ));
    }
}
