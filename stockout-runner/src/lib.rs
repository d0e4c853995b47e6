//! Stockout Runner: analysis orchestration, artifacts, leaderboards.
//!
//! This crate builds on `stockout-core` to provide:
//! - TOML configuration with validation
//! - Daily aggregate loading from CSV or Parquet with a date window
//! - Batch and streaming runs over the core pipeline
//! - CSV/JSON/Markdown artifact export with content hashes
//! - Leaderboards over an existing summary table
//! - A seeded synthetic data generator

pub mod config;
pub mod data_loader;
pub mod export;
pub mod leaderboard;
pub mod runner;

pub use config::{AnalysisConfig, ConfigError, InputFormat};
pub use data_loader::{
    generate_synthetic, load_aggregates, write_aggregates_csv, DateWindow, LoadError,
    LoadOptions, LoadedData, SynthOptions,
};
pub use export::{ArtifactWriter, Manifest};
pub use leaderboard::{LeaderboardEntry, LeaderboardError, SummaryTable};
pub use runner::{
    analyze_and_export, run_analysis, run_streaming, AnalysisResult, ExportOutcome, RunError,
    StreamOutcome,
};
