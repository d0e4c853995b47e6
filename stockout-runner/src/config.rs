//! Serializable analysis configuration.
//!
//! Loaded from TOML with three sections, every field defaulted:
//!
//! ```toml
//! [input]
//! path = "data/daily_store_product_src.csv"
//! start = "2025-12-29"   # inclusive
//! end = "2026-01-03"     # exclusive
//!
//! [analysis]
//! threshold = 0.999
//! densify_gaps = false
//! parallel = true
//! streaming = false
//! on_ordering_error = "fail"   # or "skip_group"
//!
//! [output]
//! dir = "out/oos_persistence"
//! top_n = 20
//! excel_bom = true
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockout_core::{AnalysisOptions, OrderingPolicy, StockoutClassifier, DEFAULT_THRESHOLD};

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("top_n must be at least 1")]
    ZeroTopN,

    #[error("empty date window: start {start} is not before end {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },

    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// Tabular input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Csv,
    Parquet,
}

impl InputFormat {
    /// Guess the format from a file extension.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub path: Option<PathBuf>,
    /// Overrides extension-based detection.
    pub format: Option<InputFormat>,
    /// First day kept (inclusive).
    pub start: Option<NaiveDate>,
    /// First day dropped (exclusive).
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub threshold: f64,
    pub densify_gaps: bool,
    pub parallel: bool,
    /// Consume pre-sorted input one group at a time.
    pub streaming: bool,
    pub on_ordering_error: OrderingPolicy,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            densify_gaps: false,
            parallel: true,
            streaming: false,
            on_ordering_error: OrderingPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub top_n: usize,
    /// Prefix CSV files with a UTF-8 BOM so spreadsheets pick the right encoding.
    pub excel_bom: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out/oos_persistence"),
            top_n: 20,
            excel_bom: true,
        }
    }
}

/// Complete configuration for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input: InputConfig,
    pub analysis: AnalysisSection,
    pub output: OutputConfig,
}

impl AnalysisConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.analysis.threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(ConfigError::InvalidThreshold(t));
        }
        if self.output.top_n == 0 {
            return Err(ConfigError::ZeroTopN);
        }
        if let (Some(start), Some(end)) = (self.input.start, self.input.end) {
            if start >= end {
                return Err(ConfigError::EmptyWindow { start, end });
            }
        }
        Ok(())
    }

    /// Core pipeline options derived from the `[analysis]` section.
    pub fn to_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            classifier: StockoutClassifier::new(self.analysis.threshold),
            densify_gaps: self.analysis.densify_gaps,
            parallel: self.analysis.parallel,
            on_ordering_error: self.analysis.on_ordering_error,
        }
    }

    /// Deterministic BLAKE3 fingerprint of the configuration.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
