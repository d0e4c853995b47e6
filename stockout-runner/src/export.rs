//! Artifact export: CSV tables, JSON manifest, and Markdown report.
//!
//! [`ArtifactWriter`] opens the three per-group tables up front and appends
//! each finished group as it arrives, so the batch and streaming paths share
//! one writer. Every byte written is fed to a BLAKE3 hasher; the manifest
//! records those hashes and carries no wall-clock timestamps, so rerunning on
//! identical input reproduces every file byte for byte.
//!
//! Everything is written to hidden `.partial` files first and renamed into
//! place by [`ArtifactWriter::finish`]. A run that fails part way leaves the
//! previous artifacts as they were.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockout_core::{
    top_n, FlaggedDay, GroupAnalysis, GroupSink, OrderingError, Run, StreakSummary,
};

use crate::config::AnalysisConfig;
use crate::runner::SCHEMA_VERSION;

pub const DAILY_FILE: &str = "daily_store_product.csv";
pub const RUNS_FILE: &str = "runs_store_product.csv";
pub const SUMMARY_FILE: &str = "summary_store_product_maxstreak.csv";
pub const TOP_FILE: &str = "top_store_product_full_oos_streak.csv";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const REPORT_FILE: &str = "report.md";

/// Every artifact, in commit order. The manifest goes last.
pub const ARTIFACT_FILES: [&str; 6] = [
    DAILY_FILE,
    RUNS_FILE,
    SUMMARY_FILE,
    TOP_FILE,
    REPORT_FILE,
    MANIFEST_FILE,
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const DAILY_HEADER: [&str; 8] = [
    "date",
    "store",
    "product",
    "oos_count",
    "total_count",
    "oos_rate",
    "is_full_oos",
    "run_id",
];

pub const RUNS_HEADER: [&str; 7] = [
    "store",
    "product",
    "run_id",
    "is_full_oos",
    "start_date",
    "end_date",
    "days",
];

pub const SUMMARY_HEADER: [&str; 6] = [
    "store",
    "product",
    "max_full_oos_streak_days",
    "max_streak_start_date",
    "max_streak_end_date",
    "total_full_oos_days",
];

// ─── Row formatting ─────────────────────────────────────────────────

fn date_cell(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn daily_record(day: &FlaggedDay) -> [String; 8] {
    let a = &day.aggregate;
    [
        a.date.to_string(),
        a.key.store.clone(),
        a.key.product.clone(),
        a.oos_count.to_string(),
        a.total_count.to_string(),
        a.oos_rate().map(|r| format!("{r:.6}")).unwrap_or_default(),
        day.is_full_oos.to_string(),
        day.run_id.to_string(),
    ]
}

fn run_record(run: &Run) -> [String; 7] {
    [
        run.key.store.clone(),
        run.key.product.clone(),
        run.run_id.to_string(),
        run.is_full_oos.to_string(),
        run.start_date.to_string(),
        run.end_date.to_string(),
        run.length.to_string(),
    ]
}

fn summary_record(s: &StreakSummary) -> [String; 6] {
    [
        s.key.store.clone(),
        s.key.product.clone(),
        s.max_full_oos_streak_days.to_string(),
        date_cell(s.max_streak_start_date),
        date_cell(s.max_streak_end_date),
        s.total_full_oos_days.to_string(),
    ]
}

/// Render summaries as CSV text (no BOM).
pub fn export_summary_csv(summaries: &[StreakSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(SUMMARY_HEADER)?;
    for s in summaries {
        wtr.write_record(summary_record(s))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Labels ─────────────────────────────────────────────────────────

/// Shorten a store name to `max` characters, marking the cut with `…`.
pub fn truncate_store(store: &str, max: usize) -> String {
    if store.chars().count() <= max {
        return store.to_string();
    }
    let mut short: String = store.chars().take(max).collect();
    short.push('…');
    short
}

/// Chart-style label: `store | product`, store cut to 14 characters.
pub fn group_label(summary: &StreakSummary) -> String {
    format!("{} | {}", truncate_store(&summary.key.store, 14), summary.key.product)
}

/// `total=N (start~end)`, or just `total=N` when there is no streak.
pub fn streak_note(summary: &StreakSummary) -> String {
    match (summary.max_streak_start_date, summary.max_streak_end_date) {
        (Some(start), Some(end)) => {
            format!("total={} ({start}~{end})", summary.total_full_oos_days)
        }
        _ => format!("total={}", summary.total_full_oos_days),
    }
}

// ─── Markdown report ────────────────────────────────────────────────

/// Context for the report header and manifest.
#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub config: &'a AnalysisConfig,
    pub dataset_hash: &'a str,
    pub input_rows: usize,
    pub skipped: &'a [OrderingError],
}

/// Markdown leaderboard of the top groups.
pub fn generate_report(
    top: &[StreakSummary],
    counts: &TableCounts,
    ctx: &RunContext<'_>,
) -> String {
    let mut report = String::new();
    report.push_str("# Full Stockout Streaks\n\n");

    let window = match (ctx.config.input.start, ctx.config.input.end) {
        (None, None) => "all dates".to_string(),
        (start, end) => format!(
            "{} ~ {} (end exclusive)",
            date_cell(start),
            date_cell(end)
        ),
    };
    report.push_str(&format!("- Window: {window}\n"));
    report.push_str(&format!(
        "- Threshold: oos_rate >= {}\n",
        ctx.config.analysis.threshold
    ));
    report.push_str(&format!("- Input rows: {}\n", ctx.input_rows));
    report.push_str(&format!("- Groups: {}\n", counts.groups));
    report.push_str(&format!(
        "- Groups with a full-stockout day: {}\n",
        counts.groups_with_full_oos
    ));
    if counts.gapped_full_oos_runs > 0 {
        report.push_str(&format!(
            "- Full-stockout runs spanning missing days: {} (streaks count observed days)\n",
            counts.gapped_full_oos_runs
        ));
    }
    if !ctx.skipped.is_empty() {
        report.push_str(&format!(
            "- Skipped groups (ordering violations): {}\n",
            ctx.skipped.len()
        ));
    }
    let short_hash = ctx.dataset_hash.get(..12).unwrap_or(ctx.dataset_hash);
    report.push_str(&format!("- Dataset: `{short_hash}`\n"));

    report.push_str(&format!("\n## Top {} store × product\n\n", top.len()));
    if top.is_empty() {
        report.push_str("_No groups._\n");
        return report;
    }

    report.push_str("| Rank | Store \\| Product | Max streak (days) | Total full-OOS days | Longest streak |\n");
    report.push_str("|-----:|------------------|------------------:|--------------------:|----------------|\n");
    for (i, s) in top.iter().enumerate() {
        let span = match (s.max_streak_start_date, s.max_streak_end_date) {
            (Some(start), Some(end)) => format!("{start} ~ {end}"),
            _ => "-".to_string(),
        };
        report.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            i + 1,
            group_label(s).replace('|', "\\|"),
            s.max_full_oos_streak_days,
            s.total_full_oos_days,
            span
        ));
    }
    report
}

// ─── Manifest ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub input_rows: usize,
    pub daily_rows: usize,
    pub runs: usize,
    pub groups: usize,
    pub skipped_groups: usize,
    #[serde(default)]
    pub groups_with_full_oos: usize,
    /// Full-stockout runs whose date range contains days with no record.
    #[serde(default)]
    pub gapped_full_oos_runs: usize,
}

/// Provenance for one artifact directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub config: AnalysisConfig,
    pub config_hash: String,
    pub dataset_hash: String,
    pub counts: TableCounts,
    /// File name → BLAKE3 of its bytes.
    pub tables: BTreeMap<String, String>,
    pub skipped: Vec<OrderingError>,
}

/// Load a manifest, rejecting unknown schema versions.
pub fn load_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: Manifest =
        serde_json::from_str(&json).context("failed to deserialize manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── Streaming artifact writer ──────────────────────────────────────

/// File writer that hashes everything passing through it.
struct HashingWriter {
    inner: BufWriter<File>,
    hasher: blake3::Hasher,
}

impl HashingWriter {
    fn create(path: &Path, bom: bool) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = Self {
            inner: BufWriter::new(file),
            hasher: blake3::Hasher::new(),
        };
        if bom {
            writer.write_all(UTF8_BOM)?;
        }
        Ok(writer)
    }

    fn finish(mut self) -> Result<String> {
        self.inner.flush()?;
        Ok(self.hasher.finalize().to_hex().to_string())
    }
}

impl Write for HashingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn open_table<const N: usize>(
    dir: &Path,
    name: &str,
    header: [&str; N],
    bom: bool,
) -> Result<csv::Writer<HashingWriter>> {
    let out = HashingWriter::create(&staged_path(dir, name), bom)?;
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(header)
        .with_context(|| format!("failed to write {name} header"))?;
    Ok(wtr)
}

fn close_table(wtr: csv::Writer<HashingWriter>, name: &str) -> Result<String> {
    let inner = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush {name}: {}", e.error()))?;
    inner.finish()
}

/// Hidden sibling an artifact is written to before it is committed.
pub fn staged_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{name}.partial"))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

fn write_hashed(path: &Path, bytes: &[u8]) -> Result<String> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(blake3::hash(bytes).to_hex().to_string())
}

/// Appends groups to the per-group tables; writes the rest on [`finish`].
///
/// Nothing is visible under the final names until [`finish`] succeeds. Call
/// [`discard`] on a failed run to clean up the staged files.
///
/// [`finish`]: ArtifactWriter::finish
/// [`discard`]: ArtifactWriter::discard
pub struct ArtifactWriter {
    dir: PathBuf,
    excel_bom: bool,
    daily: csv::Writer<HashingWriter>,
    runs: csv::Writer<HashingWriter>,
    summary: csv::Writer<HashingWriter>,
    summaries: Vec<StreakSummary>,
    daily_rows: usize,
    run_rows: usize,
    gapped_runs: usize,
}

impl ArtifactWriter {
    pub fn create(dir: &Path, excel_bom: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            excel_bom,
            daily: open_table(dir, DAILY_FILE, DAILY_HEADER, excel_bom)?,
            runs: open_table(dir, RUNS_FILE, RUNS_HEADER, excel_bom)?,
            summary: open_table(dir, SUMMARY_FILE, SUMMARY_HEADER, excel_bom)?,
            summaries: Vec::new(),
            daily_rows: 0,
            run_rows: 0,
            gapped_runs: 0,
        })
    }

    /// Append one group. Groups must arrive in group-key order.
    pub fn write_group(&mut self, group: &GroupAnalysis) -> Result<()> {
        for day in &group.days {
            self.daily.write_record(daily_record(day))?;
        }
        for run in &group.runs {
            self.runs.write_record(run_record(run))?;
        }
        self.summary.write_record(summary_record(&group.summary))?;

        self.daily_rows += group.days.len();
        self.run_rows += group.runs.len();
        self.gapped_runs += group
            .runs
            .iter()
            .filter(|r| r.is_full_oos && r.has_gaps())
            .count();
        self.summaries.push(group.summary.clone());
        Ok(())
    }

    /// Summaries written so far, in group-key order.
    pub fn summaries(&self) -> &[StreakSummary] {
        &self.summaries
    }

    /// Close the tables, write the top-N table, report and manifest, then
    /// move everything into place.
    pub fn finish(self, ctx: &RunContext<'_>) -> Result<Manifest> {
        let dir = self.dir.clone();
        let result = self.commit(ctx);
        if result.is_err() {
            remove_staged(&dir);
        }
        result
    }

    fn commit(self, ctx: &RunContext<'_>) -> Result<Manifest> {
        let mut tables = BTreeMap::new();
        tables.insert(DAILY_FILE.to_string(), close_table(self.daily, DAILY_FILE)?);
        tables.insert(RUNS_FILE.to_string(), close_table(self.runs, RUNS_FILE)?);
        tables.insert(SUMMARY_FILE.to_string(), close_table(self.summary, SUMMARY_FILE)?);

        let top = top_n(&self.summaries, ctx.config.output.top_n);
        let mut top_bytes = Vec::new();
        if self.excel_bom {
            top_bytes.extend_from_slice(UTF8_BOM);
        }
        top_bytes.extend_from_slice(export_summary_csv(&top)?.as_bytes());
        tables.insert(
            TOP_FILE.to_string(),
            write_hashed(&staged_path(&self.dir, TOP_FILE), &top_bytes)?,
        );

        let counts = TableCounts {
            input_rows: ctx.input_rows,
            daily_rows: self.daily_rows,
            runs: self.run_rows,
            groups: self.summaries.len(),
            skipped_groups: ctx.skipped.len(),
            groups_with_full_oos: self
                .summaries
                .iter()
                .filter(|s| s.had_full_stockout())
                .count(),
            gapped_full_oos_runs: self.gapped_runs,
        };
        let report = generate_report(&top, &counts, ctx);
        tables.insert(
            REPORT_FILE.to_string(),
            write_hashed(&staged_path(&self.dir, REPORT_FILE), report.as_bytes())?,
        );

        let manifest = Manifest {
            schema_version: SCHEMA_VERSION,
            config: ctx.config.clone(),
            config_hash: ctx.config.fingerprint()?,
            dataset_hash: ctx.dataset_hash.to_string(),
            counts,
            tables,
            skipped: ctx.skipped.to_vec(),
        };
        let json =
            serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
        std::fs::write(staged_path(&self.dir, MANIFEST_FILE), json)
            .with_context(|| format!("failed to write {MANIFEST_FILE}"))?;

        // A stale manifest must never describe half-replaced tables.
        remove_if_present(&self.dir.join(MANIFEST_FILE))?;
        for name in ARTIFACT_FILES {
            let target = self.dir.join(name);
            std::fs::rename(staged_path(&self.dir, name), &target)
                .with_context(|| format!("failed to commit {}", target.display()))?;
        }

        info!(
            dir = %self.dir.display(),
            groups = manifest.counts.groups,
            runs = manifest.counts.runs,
            "artifacts written"
        );
        Ok(manifest)
    }

    /// Abandon the run: close and delete every staged file.
    pub fn discard(self) {
        let Self {
            dir,
            daily,
            runs,
            summary,
            ..
        } = self;
        drop((daily, runs, summary));
        remove_staged(&dir);
    }
}

fn remove_staged(dir: &Path) {
    for name in ARTIFACT_FILES {
        if let Err(e) = remove_if_present(&staged_path(dir, name)) {
            warn!(error = %e, "failed to clean up staged artifact");
        }
    }
}

impl GroupSink for ArtifactWriter {
    type Error = anyhow::Error;

    fn accept(&mut self, group: GroupAnalysis) -> Result<()> {
        self.write_group(&group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockout_core::{DailyAggregate, GroupKey};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn summary(store: &str, max: usize, total: usize) -> StreakSummary {
        StreakSummary {
            key: GroupKey::new(store, "E470549"),
            max_full_oos_streak_days: max,
            max_streak_start_date: (max > 0).then(|| d(1)),
            max_streak_end_date: (max > 0).then(|| d(max as u32)),
            total_full_oos_days: total,
        }
    }

    #[test]
    fn truncates_long_store_names_by_character() {
        assert_eq!(truncate_store("Gangnam", 14), "Gangnam");
        assert_eq!(truncate_store("12345678901234", 14), "12345678901234");
        assert_eq!(truncate_store("123456789012345", 14), "12345678901234…");
        assert_eq!(truncate_store("롯데백화점 본점 잠실 월드타워", 14), "롯데백화점 본점 잠실 월드…");
    }

    #[test]
    fn label_and_note() {
        let s = summary("Lotte World Tower Mall", 3, 5);
        assert_eq!(group_label(&s), "Lotte World To… | E470549");
        assert_eq!(streak_note(&s), "total=5 (2026-01-01~2026-01-03)");
        assert_eq!(streak_note(&summary("S", 0, 0)), "total=0");
    }

    #[test]
    fn summary_csv_leaves_unset_bounds_empty() {
        let csv = export_summary_csv(&[summary("A", 2, 4), summary("B", 0, 0)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "store,product,max_full_oos_streak_days,max_streak_start_date,max_streak_end_date,total_full_oos_days"
        );
        assert_eq!(lines[1], "A,E470549,2,2026-01-01,2026-01-02,4");
        assert_eq!(lines[2], "B,E470549,0,,,0");
    }

    #[test]
    fn daily_record_formats_rate() {
        let day = FlaggedDay {
            aggregate: DailyAggregate::new("S", "P", d(2), 1, 3),
            is_full_oos: false,
            run_id: 2,
        };
        let rec = daily_record(&day);
        assert_eq!(rec[5], "0.333333");
        assert_eq!(rec[6], "false");
        assert_eq!(rec[7], "2");

        let unobserved = FlaggedDay {
            aggregate: DailyAggregate::new("S", "P", d(3), 0, 0),
            is_full_oos: false,
            run_id: 2,
        };
        assert_eq!(daily_record(&unobserved)[5], "");
    }

    #[test]
    fn report_escapes_label_pipe() {
        let config = AnalysisConfig::default();
        let ctx = RunContext {
            config: &config,
            dataset_hash: "abcdef0123456789",
            input_rows: 10,
            skipped: &[],
        };
        let counts = TableCounts {
            groups: 1,
            groups_with_full_oos: 1,
            ..TableCounts::default()
        };
        let report = generate_report(&[summary("Gangnam", 3, 5)], &counts, &ctx);
        assert!(report.contains("| 1 | Gangnam \\| E470549 | 3 | 5 | 2026-01-01 ~ 2026-01-03 |"));
        assert!(report.contains("- Window: all dates"));
        assert!(report.contains("`abcdef012345`"));
        assert!(report.contains("- Groups with a full-stockout day: 1"));
        assert!(!report.contains("Skipped"));
        assert!(!report.contains("missing days"));
    }

    #[test]
    fn report_flags_gapped_runs() {
        let config = AnalysisConfig::default();
        let ctx = RunContext {
            config: &config,
            dataset_hash: "",
            input_rows: 4,
            skipped: &[],
        };
        let counts = TableCounts {
            groups: 1,
            groups_with_full_oos: 1,
            gapped_full_oos_runs: 2,
            ..TableCounts::default()
        };
        let report = generate_report(&[summary("Gangnam", 3, 5)], &counts, &ctx);
        assert!(report.contains("- Full-stockout runs spanning missing days: 2"));
    }

    #[test]
    fn empty_report() {
        let config = AnalysisConfig::default();
        let ctx = RunContext {
            config: &config,
            dataset_hash: "",
            input_rows: 0,
            skipped: &[],
        };
        let report = generate_report(&[], &TableCounts::default(), &ctx);
        assert!(report.contains("_No groups._"));
    }
}
