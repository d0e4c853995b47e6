//! Reduce a group's runs to its streak summary.

use crate::domain::{GroupKey, Run, StreakSummary};

/// Summarize one group's ordered runs.
///
/// Only full-stockout runs contribute. The longest run wins; among equally long
/// runs the one starting earliest is chosen, regardless of slice order.
pub fn summarize_runs(key: &GroupKey, runs: &[Run]) -> StreakSummary {
    let mut longest: Option<&Run> = None;
    let mut total = 0usize;

    for run in runs.iter().filter(|r| r.is_full_oos) {
        total += run.length;
        longest = match longest {
            Some(best)
                if best.length > run.length
                    || (best.length == run.length && best.start_date <= run.start_date) =>
            {
                Some(best)
            }
            _ => Some(run),
        };
    }

    match longest {
        Some(best) => StreakSummary {
            key: key.clone(),
            max_full_oos_streak_days: best.length,
            max_streak_start_date: Some(best.start_date),
            max_streak_end_date: Some(best.end_date),
            total_full_oos_days: total,
        },
        None => StreakSummary::never_out_of_stock(key.clone()),
    }
}
