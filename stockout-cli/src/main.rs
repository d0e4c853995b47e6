//! Stockout CLI: streak analysis, leaderboards, and demo data.
//!
//! Commands:
//! - `analyze`: classify, segment and summarize daily aggregates, write artifacts
//! - `rank`: top-N leaderboard from an existing summary CSV
//! - `synth`: write a seeded synthetic daily aggregate CSV

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use stockout_core::StreakSummary;
use stockout_runner::export::{group_label, streak_note, SUMMARY_FILE};
use stockout_runner::leaderboard::{default_top_path, write_top_csv};
use stockout_runner::{
    analyze_and_export, generate_synthetic, write_aggregates_csv, AnalysisConfig, SummaryTable,
    SynthOptions,
};

#[derive(Parser)]
#[command(
    name = "stockout",
    about = "Full-day stockout persistence and streak detection per store × product"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze daily aggregates and write daily/run/summary tables.
    Analyze {
        /// Path to a TOML config file. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Daily aggregate input (.csv or .parquet).
        #[arg(long)]
        input: Option<PathBuf>,

        /// First day kept, inclusive (YYYY-MM-DD).
        #[arg(long, env = "STOCKOUT_START")]
        start: Option<NaiveDate>,

        /// First day dropped, exclusive (YYYY-MM-DD).
        #[arg(long, env = "STOCKOUT_END")]
        end: Option<NaiveDate>,

        /// Full-stockout rate threshold in (0, 1].
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of leaderboard rows to print and export.
        #[arg(long)]
        top: Option<usize>,

        /// Output directory. Defaults to out/oos_persistence.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Fill calendar gaps with unobserved days so that gaps break runs.
        #[arg(long, default_value_t = false)]
        densify_gaps: bool,

        /// Stream pre-sorted input one group at a time.
        #[arg(long, default_value_t = false)]
        streaming: bool,

        /// Process groups on one thread.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Drop groups with duplicate or out-of-order dates instead of failing.
        #[arg(long, default_value_t = false)]
        skip_bad_groups: bool,

        /// Write CSV files without the UTF-8 BOM.
        #[arg(long, default_value_t = false)]
        no_bom: bool,
    },
    /// Rank an existing summary CSV and write the top rows.
    Rank {
        /// Summary CSV produced by `analyze`.
        #[arg(long, default_value = "out/oos_persistence/summary_store_product_maxstreak.csv")]
        summary: PathBuf,

        /// Number of rows to keep.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Output CSV. Defaults to top{N}_store_product_full_oos_streak.csv next to the summary.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write the CSV without the UTF-8 BOM.
        #[arg(long, default_value_t = false)]
        no_bom: bool,
    },
    /// Write a deterministic synthetic daily aggregate CSV.
    Synth {
        /// Output CSV path.
        #[arg(long, default_value = "data/daily_store_product_synth.csv")]
        out: PathBuf,

        #[arg(long, default_value_t = 12)]
        stores: usize,

        #[arg(long, default_value_t = 40)]
        products: usize,

        #[arg(long, default_value_t = 45)]
        days: usize,

        /// First generated day (YYYY-MM-DD).
        #[arg(long, default_value = "2025-12-01")]
        start: NaiveDate,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            config,
            input,
            start,
            end,
            threshold,
            top,
            out,
            densify_gaps,
            streaming,
            sequential,
            skip_bad_groups,
            no_bom,
        } => {
            let mut cfg = match config {
                Some(path) => AnalysisConfig::from_file(&path)?,
                None => AnalysisConfig::default(),
            };
            if input.is_some() {
                cfg.input.path = input;
            }
            if start.is_some() {
                cfg.input.start = start;
            }
            if end.is_some() {
                cfg.input.end = end;
            }
            if let Some(t) = threshold {
                cfg.analysis.threshold = t;
            }
            if let Some(n) = top {
                cfg.output.top_n = n;
            }
            if let Some(dir) = out {
                cfg.output.dir = dir;
            }
            cfg.analysis.densify_gaps |= densify_gaps;
            cfg.analysis.streaming |= streaming;
            if sequential {
                cfg.analysis.parallel = false;
            }
            if skip_bad_groups {
                cfg.analysis.on_ordering_error = stockout_core::OrderingPolicy::SkipGroup;
            }
            if no_bom {
                cfg.output.excel_bom = false;
            }
            run_analyze(&cfg)
        }
        Commands::Rank {
            summary,
            top,
            out,
            no_bom,
        } => run_rank(summary, top, out, !no_bom),
        Commands::Synth {
            out,
            stores,
            products,
            days,
            start,
            seed,
        } => run_synth(
            out,
            SynthOptions {
                stores,
                products,
                start,
                days,
                seed,
            },
        ),
    }
}

fn run_analyze(config: &AnalysisConfig) -> Result<()> {
    let outcome = analyze_and_export(config)?;
    let counts = &outcome.manifest.counts;

    println!(
        "Analyzed {} rows across {} store × product groups ({} runs).",
        counts.input_rows, counts.groups, counts.runs
    );
    if counts.skipped_groups > 0 {
        println!("Skipped {} groups with ordering violations.", counts.skipped_groups);
    }
    println!(
        "\n[TOP {}] longest consecutive full-stockout days per store × product",
        outcome.top.len()
    );
    print_top(&outcome.top);
    println!(
        "\nArtifacts saved to: {} ({})",
        config.output.dir.display(),
        SUMMARY_FILE
    );
    Ok(())
}

fn run_rank(summary: PathBuf, n: usize, out: Option<PathBuf>, excel_bom: bool) -> Result<()> {
    let table = SummaryTable::read(&summary)?;
    let top = table.top(n);
    let out = out.unwrap_or_else(|| default_top_path(&summary, n));
    if let Some(dir) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    write_top_csv(&table.headers, &top, &out, excel_bom)?;
    info!(path = %out.display(), rows = top.len(), "leaderboard written");

    let summaries: Vec<StreakSummary> = top.into_iter().map(|e| e.summary).collect();
    println!("[TOP {}] {}", summaries.len(), summary.display());
    print_top(&summaries);
    println!("\nSaved: {}", out.display());
    Ok(())
}

fn run_synth(out: PathBuf, opts: SynthOptions) -> Result<()> {
    if let Some(dir) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let rows = generate_synthetic(&opts);
    write_aggregates_csv(&rows, &out)?;
    println!(
        "Wrote {} rows ({} stores × {} products × {} days, seed {}) to {}",
        rows.len(),
        opts.stores,
        opts.products,
        opts.days,
        opts.seed,
        out.display()
    );
    Ok(())
}

fn print_top(top: &[StreakSummary]) {
    if top.is_empty() {
        println!("  (no groups)");
        return;
    }
    println!("{:>4}  {:<32}  {:>10}", "#", "store | product", "max streak");
    for (i, s) in top.iter().enumerate() {
        println!(
            "{:>4}  {:<32}  {:>10}  {}",
            i + 1,
            group_label(s),
            s.max_full_oos_streak_days,
            streak_note(s)
        );
    }
}
