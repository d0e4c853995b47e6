//! Batch pipeline: classify → segment → summarize for every group.
//!
//! The input is sorted once by `(group, date)`, split into contiguous group
//! slices, and each slice runs through the per-group pipeline. Groups share no
//! state, so with `parallel` they are processed on the rayon pool; results are
//! merged back in group-key order, making parallel and sequential output
//! identical.

use std::borrow::Cow;
use std::ops::Range;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::StockoutClassifier;
use crate::domain::{DailyAggregate, FlaggedDay, GroupKey, Run, StreakSummary};
use crate::ranking;
use crate::segment::{OrderingError, RunSegmenter};
use crate::summarize::summarize_runs;

/// What to do when a group violates the ordering contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Abort the whole analysis with the first offending group.
    #[default]
    Fail,
    /// Drop the offending group from every output and keep going.
    SkipGroup,
}

/// Knobs for one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub classifier: StockoutClassifier,
    /// Fill calendar gaps with unobserved days so that gaps break runs.
    pub densify_gaps: bool,
    pub parallel: bool,
    pub on_ordering_error: OrderingPolicy,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            classifier: StockoutClassifier::default(),
            densify_gaps: false,
            parallel: true,
            on_ordering_error: OrderingPolicy::Fail,
        }
    }
}

/// Everything derived for a single group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAnalysis {
    pub key: GroupKey,
    pub days: Vec<FlaggedDay>,
    pub runs: Vec<Run>,
    pub summary: StreakSummary,
}

/// Result of a batch analysis, groups in ascending key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakAnalysis {
    pub groups: Vec<GroupAnalysis>,
    /// Groups dropped under [`OrderingPolicy::SkipGroup`].
    pub skipped: Vec<OrderingError>,
}

impl StreakAnalysis {
    pub fn days(&self) -> impl Iterator<Item = &FlaggedDay> {
        self.groups.iter().flat_map(|g| g.days.iter())
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.groups.iter().flat_map(|g| g.runs.iter())
    }

    pub fn summaries(&self) -> impl Iterator<Item = &StreakSummary> {
        self.groups.iter().map(|g| &g.summary)
    }

    pub fn top_n(&self, n: usize) -> Vec<StreakSummary> {
        let summaries: Vec<StreakSummary> = self.summaries().cloned().collect();
        ranking::top_n(&summaries, n)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Insert an unobserved day for every calendar date missing between
/// consecutive records of one date-sorted group.
pub fn densify(key: &GroupKey, records: &[DailyAggregate]) -> Vec<DailyAggregate> {
    let mut out = Vec::with_capacity(records.len());
    let mut prev: Option<NaiveDate> = None;

    for rec in records {
        if let Some(p) = prev {
            let mut missing = p + chrono::Duration::days(1);
            while missing < rec.date {
                out.push(DailyAggregate::unobserved(key.clone(), missing));
                missing += chrono::Duration::days(1);
            }
        }
        out.push(rec.clone());
        prev = Some(rec.date);
    }

    out
}

/// Run one group's date-sorted records through classify → segment → summarize.
pub fn analyze_group(
    key: &GroupKey,
    records: &[DailyAggregate],
    opts: &AnalysisOptions,
) -> Result<GroupAnalysis, OrderingError> {
    let series: Cow<'_, [DailyAggregate]> = if opts.densify_gaps {
        Cow::Owned(densify(key, records))
    } else {
        Cow::Borrowed(records)
    };

    let mut segmenter = RunSegmenter::new();
    let mut days = Vec::with_capacity(series.len());
    let mut runs = Vec::new();

    for agg in series.iter() {
        let flag = opts.classifier.classify(agg);
        let step = segmenter.push(key, agg.date, flag)?;
        runs.extend(step.closed);
        days.push(FlaggedDay {
            aggregate: agg.clone(),
            is_full_oos: flag,
            run_id: step.run_id,
        });
    }
    runs.extend(segmenter.finish());

    let summary = summarize_runs(key, &runs);
    Ok(GroupAnalysis {
        key: key.clone(),
        days,
        runs,
        summary,
    })
}

/// Analyze an arbitrary (unsorted) set of daily aggregates.
pub fn analyze(
    aggregates: &[DailyAggregate],
    opts: &AnalysisOptions,
) -> Result<StreakAnalysis, OrderingError> {
    let mut sorted = aggregates.to_vec();
    // Stable: duplicates keep their input order and are reported by the segmenter.
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let ranges = group_ranges(&sorted);
    debug!(
        rows = sorted.len(),
        groups = ranges.len(),
        parallel = opts.parallel,
        "analyzing stockout streaks"
    );

    let run_one = |range: &Range<usize>| {
        let slice = &sorted[range.clone()];
        analyze_group(&slice[0].key, slice, opts)
    };

    let results: Vec<Result<GroupAnalysis, OrderingError>> = if opts.parallel {
        ranges.par_iter().map(run_one).collect()
    } else {
        ranges.iter().map(run_one).collect()
    };

    let mut analysis = StreakAnalysis::default();
    for result in results {
        match result {
            Ok(group) => analysis.groups.push(group),
            Err(err) => match opts.on_ordering_error {
                OrderingPolicy::Fail => return Err(err),
                OrderingPolicy::SkipGroup => {
                    warn!(
                        group = %err.key(),
                        error = %err,
                        "skipping group with ordering violation"
                    );
                    analysis.skipped.push(err);
                }
            },
        }
    }

    Ok(analysis)
}

/// Index ranges of each contiguous same-key block in a key-sorted slice.
fn group_ranges(sorted: &[DailyAggregate]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i].key != sorted[start].key {
            ranges.push(start..i);
            start = i;
        }
    }
    ranges
}
