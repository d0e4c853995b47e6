use super::aggregate::GroupKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-group persistence summary.
///
/// `max_streak_start_date`/`max_streak_end_date` are `None` exactly when
/// `max_full_oos_streak_days == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub key: GroupKey,
    pub max_full_oos_streak_days: usize,
    pub max_streak_start_date: Option<NaiveDate>,
    pub max_streak_end_date: Option<NaiveDate>,
    pub total_full_oos_days: usize,
}

impl StreakSummary {
    /// Summary for a group that never had a full-stockout day.
    pub fn never_out_of_stock(key: GroupKey) -> Self {
        Self {
            key,
            max_full_oos_streak_days: 0,
            max_streak_start_date: None,
            max_streak_end_date: None,
            total_full_oos_days: 0,
        }
    }

    pub fn had_full_stockout(&self) -> bool {
        self.max_full_oos_streak_days > 0
    }
}
