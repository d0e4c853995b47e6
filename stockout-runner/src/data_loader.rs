//! Daily aggregate loading for the runner.
//!
//! Reads `(date, store, product, oos_count, total_count)` rows from CSV or
//! Parquet, applies the optional `[start, end)` window, and fingerprints the
//! result. CSV headers may use either the canonical names or the warehouse
//! export names (`dt`, `store_name`, `e_code`, `oos_cnt`, `total_cnt`); extra
//! columns such as a precomputed `oos_rate` are ignored.
//!
//! Also hosts the seeded synthetic generator used by `stockout synth`.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockout_core::data::{read_parquet, IngestError};
use stockout_core::{DailyAggregate, GroupKey};

use crate::config::InputFormat;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot tell the format of '{0}' (expected .csv or .parquet)")]
    UnknownFormat(PathBuf),

    #[error("failed to read '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("malformed CSV row {row}: {reason}")]
    Csv { row: u64, reason: String },

    #[error("invalid date '{value}' in row {row} (expected YYYY-MM-DD)")]
    InvalidDate { value: String, row: u64 },

    #[error("parquet ingest failed: {0}")]
    Ingest(#[from] IngestError),
}

/// Half-open date window `[start, end)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date < e)
    }
}

/// Options controlling how aggregates are loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub window: DateWindow,
    /// Overrides extension-based format detection.
    pub format: Option<InputFormat>,
}

/// Loaded rows in canonical `(store, product, date)` order, with provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub rows: Vec<DailyAggregate>,
    /// BLAKE3 over every kept row in canonical order.
    pub dataset_hash: String,
    /// Rows dropped by the date window.
    pub filtered_out: usize,
    /// Kept rows where `oos_count > total_count`.
    pub inconsistent: usize,
}

/// One CSV record; aliases cover the warehouse export header.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "dt")]
    date: String,
    #[serde(alias = "store_name")]
    store: String,
    #[serde(alias = "e_code")]
    product: String,
    #[serde(alias = "oos_cnt")]
    oos_count: u64,
    #[serde(alias = "total_cnt")]
    total_count: u64,
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component separated by a
/// space or `T` (`HH:MM`, `HH:MM:SS`, optional fraction). Anything else after
/// the date is rejected.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let (day, rest) = match (trimmed.get(..10), trimmed.get(10..)) {
        (Some(day), Some(rest)) if !rest.is_empty() => (day, Some(rest)),
        _ => (trimmed, None),
    };
    if let Some(rest) = rest {
        let clock = rest.strip_prefix(' ').or_else(|| rest.strip_prefix('T'))?;
        NaiveTime::parse_from_str(clock, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(clock, "%H:%M"))
            .ok()?;
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Feed one row into a dataset hasher. Shared by the batch and streaming paths.
fn hash_row(hasher: &mut blake3::Hasher, row: &DailyAggregate) {
    hasher.update(row.key.store.as_bytes());
    hasher.update(&[0]);
    hasher.update(row.key.product.as_bytes());
    hasher.update(&[0]);
    hasher.update(row.date.to_string().as_bytes());
    hasher.update(&row.oos_count.to_le_bytes());
    hasher.update(&row.total_count.to_le_bytes());
}

/// Deterministic BLAKE3 hash over rows in the given order.
pub fn compute_dataset_hash(rows: &[DailyAggregate]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        hash_row(&mut hasher, row);
    }
    hasher.finalize().to_hex().to_string()
}

fn open_file(path: &Path) -> Result<File, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    File::open(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn resolve_format(path: &Path, format: Option<InputFormat>) -> Result<InputFormat, LoadError> {
    format
        .or_else(|| InputFormat::detect(path))
        .ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))
}

/// Lazily decoded CSV rows, filtered by a window and hashed as they pass.
///
/// Drives the streaming mode, where rows must arrive already sorted.
pub struct CsvRecords {
    rows: csv::DeserializeRecordsIntoIter<std::io::BufReader<File>, CsvRow>,
    window: DateWindow,
    hasher: blake3::Hasher,
    row: u64,
    kept: usize,
    filtered_out: usize,
    inconsistent: usize,
}

impl CsvRecords {
    pub fn open(path: &Path, window: DateWindow) -> Result<Self, LoadError> {
        let file = open_file(path)?;
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(std::io::BufReader::new(file));
        Ok(Self {
            rows: reader.into_deserialize(),
            window,
            hasher: blake3::Hasher::new(),
            row: 0,
            kept: 0,
            filtered_out: 0,
            inconsistent: 0,
        })
    }

    /// Hash of the rows yielded so far, in arrival order.
    pub fn dataset_hash(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    pub fn kept(&self) -> usize {
        self.kept
    }

    pub fn filtered_out(&self) -> usize {
        self.filtered_out
    }

    pub fn inconsistent(&self) -> usize {
        self.inconsistent
    }

    fn decode(&self, raw: CsvRow) -> Result<DailyAggregate, LoadError> {
        let date = parse_date(&raw.date).ok_or_else(|| LoadError::InvalidDate {
            value: raw.date.clone(),
            row: self.row,
        })?;
        Ok(DailyAggregate {
            key: GroupKey::new(raw.store, raw.product),
            date,
            oos_count: raw.oos_count,
            total_count: raw.total_count,
        })
    }
}

impl Iterator for CsvRecords {
    type Item = Result<DailyAggregate, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.rows.next()?;
            self.row += 1;
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    return Some(Err(LoadError::Csv {
                        row: self.row,
                        reason: e.to_string(),
                    }))
                }
            };
            let record = match self.decode(raw) {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            if !self.window.contains(record.date) {
                self.filtered_out += 1;
                continue;
            }
            if record.oos_count > record.total_count {
                self.inconsistent += 1;
                warn!(
                    group = %record.key,
                    date = %record.date,
                    oos = record.oos_count,
                    total = record.total_count,
                    "oos_count exceeds total_count; keeping row"
                );
            }
            hash_row(&mut self.hasher, &record);
            self.kept += 1;
            return Some(Ok(record));
        }
    }
}

/// Load every row from `path` into memory, sorted canonically.
pub fn load_aggregates(path: &Path, opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let (mut rows, filtered_out, inconsistent) = match resolve_format(path, opts.format)? {
        InputFormat::Csv => {
            let mut records = CsvRecords::open(path, opts.window)?;
            let rows = records.by_ref().collect::<Result<Vec<_>, _>>()?;
            (rows, records.filtered_out(), records.inconsistent())
        }
        InputFormat::Parquet => {
            if !path.exists() {
                return Err(LoadError::NotFound(path.to_path_buf()));
            }
            let all = read_parquet(path)?;
            let total = all.len();
            let rows: Vec<DailyAggregate> =
                all.into_iter().filter(|r| opts.window.contains(r.date)).collect();
            let inconsistent = rows.iter().filter(|r| r.oos_count > r.total_count).count();
            if inconsistent > 0 {
                warn!(rows = inconsistent, "oos_count exceeds total_count; keeping rows");
            }
            let filtered_out = total - rows.len();
            (rows, filtered_out, inconsistent)
        }
    };

    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    let dataset_hash = compute_dataset_hash(&rows);

    info!(
        path = %path.display(),
        rows = rows.len(),
        filtered_out,
        "loaded daily aggregates"
    );
    debug!(dataset_hash = %dataset_hash, "dataset fingerprint");

    Ok(LoadedData {
        rows,
        dataset_hash,
        filtered_out,
        inconsistent,
    })
}

// ─── Synthetic input ────────────────────────────────────────────────

/// Shape of a generated dataset.
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub stores: usize,
    pub products: usize,
    pub start: NaiveDate,
    pub days: usize,
    pub seed: u64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            stores: 12,
            products: 40,
            start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap_or(NaiveDate::MIN),
            days: 45,
            seed: 42,
        }
    }
}

/// Generate daily aggregates for every store × product × day.
///
/// Each group walks a two-state chain: stockouts start with a small daily
/// probability and persist with a high one, so multi-day streaks appear. A few
/// days are unobserved (`total_count = 0`) and some days are missing outright.
/// Output is identical for identical options.
pub fn generate_synthetic(opts: &SynthOptions) -> Vec<DailyAggregate> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut rows = Vec::with_capacity(opts.stores * opts.products * opts.days);

    for s in 0..opts.stores {
        let store = format!("store_{:03}", s + 1);
        for p in 0..opts.products {
            let product = format!("E{:06}", 470_000 + p);
            let sites: u64 = rng.gen_range(1..=24);
            let mut out = false;

            for d in 0..opts.days {
                out = if out { rng.gen_bool(0.8) } else { rng.gen_bool(0.06) };

                if rng.gen_bool(0.02) {
                    continue;
                }
                let date = opts.start + chrono::Duration::days(d as i64);
                let (oos, total) = if rng.gen_bool(0.02) {
                    (0, 0)
                } else if out {
                    (sites, sites)
                } else {
                    (rng.gen_range(0..sites), sites)
                };
                rows.push(DailyAggregate::new(store.clone(), product.clone(), date, oos, total));
            }
        }
    }
    rows
}

/// Write aggregates as a canonical-header CSV, readable by [`load_aggregates`].
pub fn write_aggregates_csv(rows: &[DailyAggregate], path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(["date", "store", "product", "oos_count", "total_count"])?;
    for r in rows {
        wtr.write_record([
            r.date.to_string(),
            r.key.store.clone(),
            r.key.product.clone(),
            r.oos_count.to_string(),
            r.total_count.to_string(),
        ])?;
    }
    wtr.flush().context("failed to flush CSV writer")?;
    Ok(())
}
