//! Analysis runner: wires loading, the core pipeline, and artifact export.
//!
//! Two execution paths:
//! - `run_analysis()`: loads everything, runs the batch pipeline (parallel
//!   across groups when configured) and returns the full result.
//! - `run_streaming()`: feeds pre-sorted CSV rows one group at a time into a
//!   [`GroupSink`], holding only the current group in memory.
//!
//! `analyze_and_export()` picks the path from the config and writes artifacts.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use stockout_core::{
    analyze, stream_into, DailyAggregate, GroupSink, OrderingError, StreakAnalysis,
    StreakSummary, StreamStats,
};

use crate::config::{AnalysisConfig, ConfigError, InputFormat};
use crate::data_loader::{load_aggregates, CsvRecords, DateWindow, LoadError, LoadOptions};
use crate::export::{ArtifactWriter, Manifest, RunContext};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("ordering error: {0}")]
    Ordering(#[from] OrderingError),
    #[error("no input path configured (set [input].path or pass --input)")]
    MissingInput,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a batch analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config: AnalysisConfig,
    pub dataset_hash: String,
    pub input_rows: usize,
    pub filtered_out: usize,
    pub analysis: StreakAnalysis,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl AnalysisResult {
    /// Top groups per the configured `top_n`.
    pub fn top(&self) -> Vec<StreakSummary> {
        self.analysis.top_n(self.config.output.top_n)
    }
}

/// Outcome of a streaming pass; group results went to the sink.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub dataset_hash: String,
    pub input_rows: usize,
    pub filtered_out: usize,
    pub stats: StreamStats,
}

fn input_path(config: &AnalysisConfig) -> Result<&PathBuf, RunError> {
    config.input.path.as_ref().ok_or(RunError::MissingInput)
}

fn load_options(config: &AnalysisConfig) -> LoadOptions {
    LoadOptions {
        window: DateWindow::new(config.input.start, config.input.end),
        format: config.input.format,
    }
}

/// Load the configured input and run the batch pipeline.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisResult, RunError> {
    config.validate()?;
    let path = input_path(config)?;
    let loaded = load_aggregates(path, &load_options(config))?;
    run_analysis_from_rows(
        config,
        &loaded.rows,
        &loaded.dataset_hash,
        loaded.filtered_out,
    )
}

/// Run the batch pipeline on pre-loaded rows. No I/O.
pub fn run_analysis_from_rows(
    config: &AnalysisConfig,
    rows: &[DailyAggregate],
    dataset_hash: &str,
    filtered_out: usize,
) -> Result<AnalysisResult, RunError> {
    let analysis = analyze(rows, &config.to_options())?;
    info!(
        rows = rows.len(),
        groups = analysis.groups.len(),
        skipped = analysis.skipped.len(),
        "batch analysis complete"
    );
    Ok(AnalysisResult {
        schema_version: SCHEMA_VERSION,
        config: config.clone(),
        dataset_hash: dataset_hash.to_string(),
        input_rows: rows.len(),
        filtered_out,
        analysis,
    })
}

/// Stream the configured input into `sink`, one group at a time.
///
/// CSV input is decoded lazily and must already be sorted by
/// `(store, product, date)`. Parquet input is read whole, sorted, and then
/// streamed.
pub fn run_streaming<S>(config: &AnalysisConfig, sink: &mut S) -> Result<StreamOutcome, S::Error>
where
    S: GroupSink,
    S::Error: From<RunError>,
{
    config.validate().map_err(RunError::from)?;
    let path = input_path(config)?;
    let opts = config.to_options();
    let load_opts = load_options(config);

    let format = load_opts
        .format
        .or_else(|| InputFormat::detect(path))
        .ok_or_else(|| RunError::Data(LoadError::UnknownFormat(path.clone())))?;

    let outcome = match format {
        InputFormat::Parquet => {
            info!("parquet input is loaded whole before streaming");
            let loaded = load_aggregates(path, &load_opts).map_err(RunError::from)?;
            let input_rows = loaded.rows.len();
            let stats = stream_into(
                loaded.rows.into_iter().map(Ok::<_, RunError>),
                &opts,
                sink,
            )?;
            StreamOutcome {
                dataset_hash: loaded.dataset_hash,
                input_rows,
                filtered_out: loaded.filtered_out,
                stats,
            }
        }
        InputFormat::Csv => {
            let mut records = CsvRecords::open(path, load_opts.window).map_err(RunError::from)?;
            let stats = stream_into(
                records.by_ref().map(|r| r.map_err(RunError::from)),
                &opts,
                sink,
            )?;
            StreamOutcome {
                dataset_hash: records.dataset_hash(),
                input_rows: records.kept(),
                filtered_out: records.filtered_out(),
                stats,
            }
        }
    };

    info!(
        rows = outcome.input_rows,
        groups = outcome.stats.groups,
        skipped = outcome.stats.skipped.len(),
        "streaming analysis complete"
    );
    Ok(outcome)
}

/// What `analyze_and_export` produced.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub manifest: Manifest,
    /// Leaderboard rows, `top_n` long at most.
    pub top: Vec<StreakSummary>,
}

/// Run the configured analysis and write every artifact to `output.dir`.
pub fn analyze_and_export(config: &AnalysisConfig) -> anyhow::Result<ExportOutcome> {
    config.validate()?;
    if config.input.path.is_none() {
        return Err(RunError::MissingInput.into());
    }
    let dir = &config.output.dir;

    let (writer, dataset_hash, input_rows, skipped) = if config.analysis.streaming {
        let mut writer = ArtifactWriter::create(dir, config.output.excel_bom)?;
        let outcome = match run_streaming(config, &mut writer) {
            Ok(outcome) => outcome,
            Err(e) => {
                writer.discard();
                return Err(e);
            }
        };
        (writer, outcome.dataset_hash, outcome.input_rows, outcome.stats.skipped)
    } else {
        let result = run_analysis(config).context("analysis failed")?;
        let mut writer = ArtifactWriter::create(dir, config.output.excel_bom)?;
        for group in &result.analysis.groups {
            if let Err(e) = writer.write_group(group) {
                writer.discard();
                return Err(e);
            }
        }
        (writer, result.dataset_hash, result.input_rows, result.analysis.skipped)
    };

    let top = stockout_core::top_n(writer.summaries(), config.output.top_n);
    let ctx = RunContext {
        config,
        dataset_hash: &dataset_hash,
        input_rows,
        skipped: &skipped,
    };
    let manifest = writer.finish(&ctx)?;
    Ok(ExportOutcome { manifest, top })
}
