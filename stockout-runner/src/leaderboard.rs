//! Leaderboard over an existing summary table.
//!
//! Reads `summary_store_product_maxstreak.csv` (or any CSV with the same
//! columns, canonical or warehouse-named), ranks it with the core leaderboard
//! order and writes the top rows back out with every original column intact.
//! Unparseable or empty streak counts are treated as 0.

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use stockout_core::{compare_summaries, GroupKey, StreakSummary};

use crate::data_loader::parse_date;

/// Columns a summary table must carry: canonical name plus accepted aliases.
const REQUIRED: [(&str, &[&str]); 4] = [
    ("store", &["store", "store_name"]),
    ("product", &["product", "e_code"]),
    ("max_full_oos_streak_days", &["max_full_oos_streak_days"]),
    ("total_full_oos_days", &["total_full_oos_days"]),
];

const START_ALIASES: &[&str] = &["max_streak_start_date", "max_streak_start_dt"];
const END_ALIASES: &[&str] = &["max_streak_end_date", "max_streak_end_dt"];

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("summary file not found: {0} (run `stockout analyze` first)")]
    NotFound(PathBuf),

    #[error("failed to read '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("summary CSV is missing columns {missing:?}; present columns: {present:?}")]
    MissingColumns {
        missing: Vec<String>,
        present: Vec<String>,
    },

    #[error("malformed summary CSV: {0}")]
    Csv(String),
}

/// One ranked row: parsed metrics plus the untouched source record.
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub summary: StreakSummary,
    pub record: csv::StringRecord,
}

/// Parsed summary table.
#[derive(Debug, Clone)]
pub struct SummaryTable {
    pub headers: csv::StringRecord,
    pub entries: Vec<LeaderboardEntry>,
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == *alias))
}

/// Lenient count parsing: `"3"`, `"3.0"` → 3; empty or garbage → 0.
fn coerce_count(cell: Option<&str>) -> usize {
    let cell = cell.unwrap_or("").trim();
    if let Ok(n) = cell.parse::<usize>() {
        return n;
    }
    match cell.parse::<f64>() {
        Ok(x) if x.is_finite() && x > 0.0 => x as usize,
        _ => 0,
    }
}

impl SummaryTable {
    pub fn read(path: &Path) -> Result<Self, LeaderboardError> {
        if !path.exists() {
            return Err(LeaderboardError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| LeaderboardError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, LeaderboardError> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| LeaderboardError::Csv(e.to_string()))?
            .clone();

        let mut indices = Vec::with_capacity(REQUIRED.len());
        let mut missing = Vec::new();
        for (name, aliases) in REQUIRED {
            match find_column(&headers, aliases) {
                Some(i) => indices.push(i),
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(LeaderboardError::MissingColumns {
                missing,
                present: headers.iter().map(str::to_string).collect(),
            });
        }
        let (store, product, max, total) = (indices[0], indices[1], indices[2], indices[3]);
        let start = find_column(&headers, START_ALIASES);
        let end = find_column(&headers, END_ALIASES);

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| LeaderboardError::Csv(e.to_string()))?;
            let cell = |i: usize| record.get(i).unwrap_or("");
            let summary = StreakSummary {
                key: GroupKey::new(cell(store), cell(product)),
                max_full_oos_streak_days: coerce_count(record.get(max)),
                max_streak_start_date: start.and_then(|i| parse_date(cell(i))),
                max_streak_end_date: end.and_then(|i| parse_date(cell(i))),
                total_full_oos_days: coerce_count(record.get(total)),
            };
            entries.push(LeaderboardEntry { summary, record });
        }
        Ok(Self { headers, entries })
    }

    /// The first `n` rows in leaderboard order.
    pub fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| compare_summaries(&a.summary, &b.summary));
        ranked.truncate(n);
        ranked
    }
}

/// Write ranked rows with the source header, optionally BOM-prefixed.
pub fn write_top_csv(
    headers: &csv::StringRecord,
    entries: &[LeaderboardEntry],
    path: &Path,
    excel_bom: bool,
) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(headers)?;
    for entry in entries {
        wtr.write_record(&entry.record)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;

    let mut bytes = Vec::with_capacity(data.len() + 3);
    if excel_bom {
        bytes.extend_from_slice(b"\xEF\xBB\xBF");
    }
    bytes.extend_from_slice(&data);
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Default output name next to the summary: `top{n}_store_product_full_oos_streak.csv`.
pub fn default_top_path(summary_path: &Path, n: usize) -> PathBuf {
    let dir = summary_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("top{n}_store_product_full_oos_streak.csv"))
}
