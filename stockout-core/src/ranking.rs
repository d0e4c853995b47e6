//! Leaderboard ordering of streak summaries.
//!
//! Order: longest max streak first, then most total full-stockout days, then
//! group key ascending so that equal metrics never depend on input order.

use std::cmp::Ordering;

use crate::domain::StreakSummary;

/// Total order used by the leaderboard.
pub fn compare_summaries(a: &StreakSummary, b: &StreakSummary) -> Ordering {
    b.max_full_oos_streak_days
        .cmp(&a.max_full_oos_streak_days)
        .then_with(|| b.total_full_oos_days.cmp(&a.total_full_oos_days))
        .then_with(|| a.key.cmp(&b.key))
}

/// All summaries in leaderboard order.
pub fn rank_summaries(summaries: &[StreakSummary]) -> Vec<StreakSummary> {
    let mut ranked = summaries.to_vec();
    ranked.sort_by(compare_summaries);
    ranked
}

/// The first `n` summaries in leaderboard order (all of them if fewer exist).
pub fn top_n(summaries: &[StreakSummary], n: usize) -> Vec<StreakSummary> {
    let mut ranked = rank_summaries(summaries);
    ranked.truncate(n);
    ranked
}
