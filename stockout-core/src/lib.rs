//! Stockout Core: persistence and streak detection for store/product stockouts.
//!
//! This crate contains the analysis engine:
//! - Domain types (daily aggregates, group keys, runs, streak summaries)
//! - Full-stockout classifier with a configurable rate threshold
//! - Run-length segmenter as an explicit state machine over sorted records
//! - Streak summarizer with deterministic tie-breaking
//! - Leaderboard ranking
//! - Batch (optionally parallel) and grouped-streaming pipelines
//! - Polars-backed schema validation and Parquet ingestion

pub mod classify;
pub mod data;
pub mod domain;
pub mod pipeline;
pub mod ranking;
pub mod segment;
pub mod stream;
pub mod summarize;

pub use classify::{StockoutClassifier, DEFAULT_THRESHOLD};
pub use domain::{DailyAggregate, FlaggedDay, GroupKey, Run, StreakSummary};
pub use pipeline::{
    analyze, analyze_group, densify, AnalysisOptions, GroupAnalysis, OrderingPolicy,
    StreakAnalysis,
};
pub use ranking::{compare_summaries, rank_summaries, top_n};
pub use segment::{segment_group, OrderingError, RunSegmenter, Step};
pub use stream::{analyze_sorted, stream_into, GroupSink, StreamStats, StreamingAnalyzer};
pub use summarize::summarize_runs;
