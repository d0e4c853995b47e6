//! End-to-end runs: input file → analysis → artifact directory.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use stockout_core::{DailyAggregate, OrderingPolicy};
use stockout_runner::export::{
    load_manifest, DAILY_FILE, MANIFEST_FILE, REPORT_FILE, RUNS_FILE, SUMMARY_FILE, TOP_FILE,
};
use stockout_runner::{
    analyze_and_export, generate_synthetic, write_aggregates_csv, AnalysisConfig, SummaryTable,
    SynthOptions,
};

const WAREHOUSE_CSV: &str = "dt,store_name,e_code,oos_cnt,total_cnt,oos_rate\n\
2025-12-29,Gangnam,E470549,6,6,1.0\n\
2025-12-30,Gangnam,E470549,6,6,1.0\n\
2025-12-31,Gangnam,E470549,2,6,0.333\n\
2026-01-01,Gangnam,E470549,6,6,1.0\n\
2026-01-02,Gangnam,E470549,6,6,1.0\n\
2026-01-03,Gangnam,E470549,6,6,1.0\n\
2025-12-29,Jamsil,E100001,0,0,\n\
2025-12-30,Jamsil,E100001,1,4,0.25\n\
2025-12-28,Jamsil,E100001,4,4,1.0\n";

const ALL_FILES: [&str; 6] = [
    DAILY_FILE,
    RUNS_FILE,
    SUMMARY_FILE,
    TOP_FILE,
    MANIFEST_FILE,
    REPORT_FILE,
];

fn config_for(input: &Path, out: &Path) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.input.path = Some(input.to_path_buf());
    config.output.dir = out.to_path_buf();
    config
}

fn read(dir: &Path, name: &str) -> Vec<u8> {
    std::fs::read(dir.join(name)).unwrap()
}

fn read_text(dir: &Path, name: &str) -> String {
    String::from_utf8(read(dir, name))
        .unwrap()
        .trim_start_matches('\u{feff}')
        .to_string()
}

fn write_input(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn batch_run_writes_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(tmp.path(), "src.csv", WAREHOUSE_CSV);
    let out = tmp.path().join("out");

    let outcome = analyze_and_export(&config_for(&input, &out)).unwrap();

    for name in ALL_FILES {
        assert!(out.join(name).exists(), "{name} missing");
    }
    assert!(read(&out, DAILY_FILE).starts_with(b"\xEF\xBB\xBF"));

    let summary = read_text(&out, SUMMARY_FILE);
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "Gangnam,E470549,3,2026-01-01,2026-01-03,5");
    assert_eq!(lines[2], "Jamsil,E100001,1,2025-12-28,2025-12-28,1");

    let runs = read_text(&out, RUNS_FILE);
    assert!(runs.contains("Gangnam,E470549,1,true,2025-12-29,2025-12-30,2"));
    assert!(runs.contains("Gangnam,E470549,2,false,2025-12-31,2025-12-31,1"));
    assert!(runs.contains("Gangnam,E470549,3,true,2026-01-01,2026-01-03,3"));

    let daily = read_text(&out, DAILY_FILE);
    assert!(daily.contains("2025-12-29,Jamsil,E100001,0,0,,false,2"));

    assert_eq!(outcome.top.len(), 2);
    assert_eq!(outcome.top[0].key.store, "Gangnam");
    assert_eq!(outcome.manifest.counts.input_rows, 9);
    assert_eq!(outcome.manifest.counts.daily_rows, 9);
    assert_eq!(outcome.manifest.counts.groups, 2);
    assert_eq!(outcome.manifest.counts.runs, 5);
}

#[test]
fn rerun_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(tmp.path(), "src.csv", WAREHOUSE_CSV);
    let out = tmp.path().join("out");
    let config = config_for(&input, &out);

    analyze_and_export(&config).unwrap();
    let first: Vec<Vec<u8>> = ALL_FILES.iter().map(|n| read(&out, n)).collect();

    analyze_and_export(&config).unwrap();
    let second: Vec<Vec<u8>> = ALL_FILES.iter().map(|n| read(&out, n)).collect();

    assert_eq!(first, second);
}

#[test]
fn manifest_hashes_match_files() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(tmp.path(), "src.csv", WAREHOUSE_CSV);
    let out = tmp.path().join("out");
    analyze_and_export(&config_for(&input, &out)).unwrap();

    let manifest = load_manifest(&out).unwrap();
    assert_eq!(manifest.tables.len(), 5);
    for (name, hash) in &manifest.tables {
        let actual = blake3::hash(&read(&out, name)).to_hex().to_string();
        assert_eq!(&actual, hash, "{name}");
    }
    assert_eq!(manifest.dataset_hash.len(), 64);
    assert!(manifest.skipped.is_empty());
}

#[test]
fn date_window_is_half_open() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(tmp.path(), "src.csv", WAREHOUSE_CSV);
    let out = tmp.path().join("out");
    let mut config = config_for(&input, &out);
    config.input.start = NaiveDate::from_ymd_opt(2025, 12, 29);
    config.input.end = NaiveDate::from_ymd_opt(2026, 1, 3);

    let outcome = analyze_and_export(&config).unwrap();
    // Drops 2025-12-28 (Jamsil) and 2026-01-03 (Gangnam).
    assert_eq!(outcome.manifest.counts.input_rows, 7);

    let gangnam = &outcome.top[0];
    assert_eq!(gangnam.max_full_oos_streak_days, 2);
    assert_eq!(gangnam.total_full_oos_days, 4);
    let jamsil = &outcome.top[1];
    assert_eq!(jamsil.max_full_oos_streak_days, 0);
    assert_eq!(jamsil.max_streak_start_date, None);

    let report = read_text(&out, REPORT_FILE);
    assert!(report.contains("2025-12-29 ~ 2026-01-03 (end exclusive)"));
}

#[test]
fn gapped_runs_are_counted_unless_densified() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(
        tmp.path(),
        "gaps.csv",
        "date,store,product,oos_count,total_count\n\
         2026-01-01,A,1,3,3\n\
         2026-01-02,A,1,3,3\n\
         2026-01-04,A,1,3,3\n\
         2026-01-01,B,1,0,3\n",
    );
    let out = tmp.path().join("out");
    let mut config = config_for(&input, &out);

    let outcome = analyze_and_export(&config).unwrap();
    assert_eq!(outcome.top[0].max_full_oos_streak_days, 3);
    assert_eq!(outcome.manifest.counts.groups_with_full_oos, 1);
    assert_eq!(outcome.manifest.counts.gapped_full_oos_runs, 1);
    assert!(read_text(&out, REPORT_FILE).contains("- Full-stockout runs spanning missing days: 1"));

    config.analysis.densify_gaps = true;
    let outcome = analyze_and_export(&config).unwrap();
    assert_eq!(outcome.top[0].max_full_oos_streak_days, 2);
    assert_eq!(outcome.manifest.counts.gapped_full_oos_runs, 0);
    assert!(!read_text(&out, REPORT_FILE).contains("missing days"));
}

#[test]
fn streaming_matches_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("synth.csv");
    let rows = generate_synthetic(&SynthOptions {
        stores: 4,
        products: 6,
        days: 30,
        ..SynthOptions::default()
    });
    write_aggregates_csv(&rows, &input).unwrap();

    let batch_out = tmp.path().join("batch");
    let stream_out = tmp.path().join("stream");
    let batch = analyze_and_export(&config_for(&input, &batch_out)).unwrap();

    let mut config = config_for(&input, &stream_out);
    config.analysis.streaming = true;
    let stream = analyze_and_export(&config).unwrap();

    for name in [DAILY_FILE, RUNS_FILE, SUMMARY_FILE, TOP_FILE] {
        assert_eq!(read(&batch_out, name), read(&stream_out, name), "{name}");
    }
    assert_eq!(batch.manifest.dataset_hash, stream.manifest.dataset_hash);
    assert_eq!(batch.manifest.counts, stream.manifest.counts);
    assert_eq!(batch.top, stream.top);
}

#[test]
fn streaming_skips_group_with_duplicate_dates() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(
        tmp.path(),
        "dup.csv",
        "date,store,product,oos_count,total_count\n\
         2026-01-01,A,1,3,3\n\
         2026-01-01,A,1,3,3\n\
         2026-01-01,B,1,3,3\n\
         2026-01-02,B,1,3,3\n",
    );
    let out = tmp.path().join("out");
    let mut config = config_for(&input, &out);
    config.analysis.streaming = true;
    config.analysis.on_ordering_error = OrderingPolicy::SkipGroup;

    let outcome = analyze_and_export(&config).unwrap();
    assert_eq!(outcome.manifest.counts.groups, 1);
    assert_eq!(outcome.manifest.counts.skipped_groups, 1);
    assert_eq!(outcome.manifest.skipped[0].key().store, "A");
    assert!(!read_text(&out, DAILY_FILE).contains(",A,"));

    config.analysis.on_ordering_error = OrderingPolicy::Fail;
    assert!(analyze_and_export(&config).is_err());
}

#[test]
fn failed_stream_keeps_previous_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(
        tmp.path(),
        "dup.csv",
        "date,store,product,oos_count,total_count\n\
         2026-01-01,A,1,3,3\n\
         2026-01-01,A,1,3,3\n\
         2026-01-01,B,1,3,3\n\
         2026-01-02,B,1,3,3\n",
    );
    let out = tmp.path().join("out");
    let mut config = config_for(&input, &out);
    config.analysis.streaming = true;
    config.analysis.on_ordering_error = OrderingPolicy::SkipGroup;
    analyze_and_export(&config).unwrap();
    let before: Vec<Vec<u8>> = ALL_FILES.iter().map(|n| read(&out, n)).collect();

    config.analysis.on_ordering_error = OrderingPolicy::Fail;
    assert!(analyze_and_export(&config).is_err());

    let after: Vec<Vec<u8>> = ALL_FILES.iter().map(|n| read(&out, n)).collect();
    assert_eq!(before, after);

    let manifest = load_manifest(&out).unwrap();
    for (name, hash) in &manifest.tables {
        let actual = blake3::hash(&read(&out, name)).to_hex().to_string();
        assert_eq!(&actual, hash, "{name}");
    }

    let mut names: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let mut expected: Vec<String> = ALL_FILES.iter().map(|n| n.to_string()).collect();
    expected.sort();
    assert_eq!(names, expected, "staged files left behind");
}

#[test]
fn failed_batch_run_keeps_previous_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(tmp.path(), "src.csv", WAREHOUSE_CSV);
    let out = tmp.path().join("out");
    analyze_and_export(&config_for(&input, &out)).unwrap();
    let before = read(&out, SUMMARY_FILE);

    let broken = write_input(
        tmp.path(),
        "broken.csv",
        "date,store,product,oos_count,total_count\n2026-01-01,A,1,1,1\n2026-01-01,A,1,1,1\n",
    );
    let err = analyze_and_export(&config_for(&broken, &out)).unwrap_err();
    assert!(format!("{err:#}").contains("ordering"));
    assert_eq!(read(&out, SUMMARY_FILE), before);
}

#[test]
fn parquet_input() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("src.parquet");
    let day = |d: u32| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
    let rows = vec![
        DailyAggregate::new("S", "P", day(1), 5, 5),
        DailyAggregate::new("S", "P", day(2), 5, 5),
        DailyAggregate::new("S", "P", day(3), 0, 5),
    ];
    stockout_core::data::write_parquet(&rows, &input).unwrap();

    let out = tmp.path().join("out");
    let mut config = config_for(&input, &out);
    config.output.excel_bom = false;
    let outcome = analyze_and_export(&config).unwrap();

    assert_eq!(outcome.top[0].max_full_oos_streak_days, 2);
    assert!(!read(&out, SUMMARY_FILE).starts_with(b"\xEF\xBB\xBF"));
}

#[test]
fn missing_input_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_for(&tmp.path().join("absent.csv"), &tmp.path().join("out"));
    let err = analyze_and_export(&config).unwrap_err();
    assert!(format!("{err:#}").contains("not found"));
}

#[test]
fn rank_reads_exported_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let input = write_input(tmp.path(), "src.csv", WAREHOUSE_CSV);
    let out = tmp.path().join("out");
    let outcome = analyze_and_export(&config_for(&input, &out)).unwrap();

    let table = SummaryTable::read(&out.join(SUMMARY_FILE)).unwrap();
    let ranked: Vec<_> = table.top(10).into_iter().map(|e| e.summary).collect();
    assert_eq!(ranked, outcome.top);
}
