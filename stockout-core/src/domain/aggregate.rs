//! DailyAggregate: one (store, product, date) inventory observation summary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one independent time series: a product at a store.
///
/// Ordering is lexical on `store`, then `product`. Every sorted output in the
/// workspace relies on this derived ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub store: String,
    pub product: String,
}

impl GroupKey {
    pub fn new(store: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            product: product.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.store, self.product)
    }
}

/// Aggregated stock observations for one group on one calendar day.
///
/// `oos_count` counts variant snapshots reporting out-of-stock (or low stock);
/// `total_count` counts all snapshots taken that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub key: GroupKey,
    pub date: NaiveDate,
    pub oos_count: u64,
    pub total_count: u64,
}

impl DailyAggregate {
    pub fn new(
        store: impl Into<String>,
        product: impl Into<String>,
        date: NaiveDate,
        oos_count: u64,
        total_count: u64,
    ) -> Self {
        Self {
            key: GroupKey::new(store, product),
            date,
            oos_count,
            total_count,
        }
    }

    /// Fraction of observations reporting out-of-stock.
    ///
    /// `None` when nothing was observed that day (`total_count == 0`).
    pub fn oos_rate(&self) -> Option<f64> {
        if self.total_count == 0 {
            return None;
        }
        Some(self.oos_count as f64 / self.total_count as f64)
    }

    /// Placeholder for a calendar day with no snapshot at all.
    pub fn unobserved(key: GroupKey, date: NaiveDate) -> Self {
        Self {
            key,
            date,
            oos_count: 0,
            total_count: 0,
        }
    }

    /// Canonical sort key: group first, then date.
    pub fn sort_key(&self) -> (&GroupKey, NaiveDate) {
        (&self.key, self.date)
    }
}

/// A daily aggregate with its derived full-stockout flag and the 1-based id of
/// the run it belongs to within its group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedDay {
    pub aggregate: DailyAggregate,
    pub is_full_oos: bool,
    pub run_id: usize,
}
