//! Run: a maximal stretch of same-flag records within one group.

use super::aggregate::GroupKey;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Contiguous, maximal sequence of records sharing one stockout flag.
///
/// `length` counts records, not calendar days: a run spanning a missing
/// snapshot day has `length < (end_date - start_date) + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub key: GroupKey,
    /// 1-based position of this run within its group.
    pub run_id: usize,
    pub is_full_oos: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub length: usize,
}

impl Run {
    /// Calendar days covered from start to end, inclusive.
    pub fn calendar_span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// True if one or more calendar days inside the run had no record.
    pub fn has_gaps(&self) -> bool {
        self.calendar_span_days() > self.length as i64
    }
}
