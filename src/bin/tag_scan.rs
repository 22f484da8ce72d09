//! Tag scan driver: run detection or calibration over a CSV export.
//!
//! Stands in for the archive, scheduler and report layers so the pipeline
//! can be exercised end to end from the shell.
//!
//! CSV format (header required): `tag,unit,timestamp,value` with RFC 3339
//! timestamps. Empty or non-numeric values are read as NaN and dropped by the
//! quality filter.
//!
//! Usage:
//!   tag-scan detect --csv data/K-31-01.csv --unit K-31-01
//!   tag-scan detect --csv data/K-31-01.csv --unit K-31-01 --db data/profiles --start 2026-05-01T00:00:00Z
//!   tag-scan calibrate --csv data/history.csv --db data/profiles

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use turbowatch::storage::{InMemoryProfileStore, InMemorySeriesSource, ProfileStore, SledProfileStore};
use turbowatch::{AnomalyPipeline, CancellationFlag, DetectionConfig, DetectionWindow, TagSample, TagSeries};

#[derive(Parser, Debug)]
#[command(name = "tag-scan")]
#[command(about = "Anomaly detection and baseline calibration over tag CSV exports")]
#[command(version)]
struct CliArgs {
    /// Detection config TOML (defaults to $TURBOWATCH_CONFIG, ./turbowatch.toml, built-in)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect anomalies for one unit and print JSON records
    Detect {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        unit: String,

        /// Window start (RFC 3339); defaults to the first sample
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Window end (RFC 3339); defaults to the last sample
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Sled profile store to read calibrated baselines from
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print per-tag reports alongside the records
        #[arg(long)]
        report: bool,
    },

    /// Calibrate every tag in the file and store the profiles
    Calibrate {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        db: PathBuf,

        /// Only calibrate this unit
        #[arg(long)]
        unit: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = match &args.config {
        Some(path) => DetectionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DetectionConfig::load(),
    };

    match args.command {
        Command::Detect {
            csv,
            unit,
            start,
            end,
            db,
            report,
        } => run_detect(config, &csv, &unit, start, end, db.as_deref(), report),
        Command::Calibrate { csv, db, unit } => run_calibrate(config, &csv, &db, unit.as_deref()),
    }
}

fn run_detect(
    config: DetectionConfig,
    csv: &Path,
    unit: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    db: Option<&Path>,
    report: bool,
) -> Result<()> {
    let source = load_csv(csv)?;
    let tags = source.tags_for_unit(unit);
    if tags.is_empty() {
        bail!("No tags for unit {unit} in {}", csv.display());
    }
    let (first, last) = source
        .time_span()
        .context("CSV contains no samples")?;
    let window = DetectionWindow::new(start.unwrap_or(first), end.unwrap_or(last));

    let profiles: Arc<dyn ProfileStore> = match db {
        Some(path) => Arc::new(
            SledProfileStore::open(path)
                .with_context(|| format!("Failed to open profile store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryProfileStore::new()),
    };

    let pipeline = AnomalyPipeline::new(config, Arc::new(source), profiles)?;
    let run = pipeline.detect_with_report(unit, &tags, window, &CancellationFlag::new())?;

    let output = if report {
        serde_json::to_string_pretty(&run)?
    } else {
        serde_json::to_string_pretty(&run.records)?
    };
    println!("{output}");
    Ok(())
}

fn run_calibrate(config: DetectionConfig, csv: &Path, db: &Path, unit: Option<&str>) -> Result<()> {
    let source = load_csv(csv)?;
    let (first, last) = source
        .time_span()
        .context("CSV contains no samples")?;
    let window = DetectionWindow::new(first, last);

    let mut by_unit: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (tag, unit_id) in source.tag_units() {
        if unit.map_or(true, |u| u == unit_id) {
            by_unit.entry(unit_id.to_string()).or_default().push(tag.to_string());
        }
    }
    if by_unit.is_empty() {
        bail!("No matching tags in {}", csv.display());
    }

    let store = Arc::new(
        SledProfileStore::open(db)
            .with_context(|| format!("Failed to open profile store {}", db.display()))?,
    );
    let pipeline = AnomalyPipeline::new(config, Arc::new(source), store.clone())?;

    let mut summaries = Vec::new();
    for (unit_id, mut tags) in by_unit {
        tags.sort();
        let calibration = pipeline.calibrate_unit(&unit_id, &tags, window)?;
        summaries.push(calibration.summary);
    }
    store.flush()?;

    info!(units = summaries.len(), db = %db.display(), "Profiles stored");
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

/// Read `tag,unit,timestamp,value` rows into one series per tag.
fn load_csv(path: &Path) -> Result<InMemorySeriesSource> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut lines = text.lines();
    let header = lines.next().context("CSV is empty")?;
    let columns: Vec<String> = header.split(',').map(|c| c.trim().to_lowercase()).collect();
    let index_of = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .with_context(|| format!("CSV header is missing column '{name}'"))
    };
    let (tag_col, unit_col, ts_col, value_col) = (
        index_of("tag")?,
        index_of("unit")?,
        index_of("timestamp")?,
        index_of("value")?,
    );

    let mut samples: BTreeMap<String, Vec<TagSample>> = BTreeMap::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |i: usize| {
            fields
                .get(i)
                .copied()
                .with_context(|| format!("Line {}: too few columns", line_no + 2))
        };
        let timestamp: DateTime<Utc> = field(ts_col)?
            .parse()
            .with_context(|| format!("Line {}: bad timestamp", line_no + 2))?;
        let sample = TagSample {
            tag_id: field(tag_col)?.to_string(),
            unit_id: field(unit_col)?.to_string(),
            timestamp,
            value: field(value_col)?.parse().unwrap_or(f64::NAN),
        };
        samples.entry(sample.tag_id.clone()).or_default().push(sample);
    }

    let mut source = InMemorySeriesSource::new();
    for (tag, mut tag_samples) in samples {
        tag_samples.sort_by_key(|s| s.timestamp);
        let unit = tag_samples
            .first()
            .map(|s| s.unit_id.clone())
            .unwrap_or_default();
        let series = TagSeries::from_samples(&tag, &unit, tag_samples)
            .with_context(|| format!("Invalid samples for tag {tag}"))?;
        source.insert(series);
    }
    info!(path = %path.display(), tags = source.tags().count(), "CSV loaded");
    Ok(source)
}
