//! Full-stockout classification of a single daily aggregate.

use serde::{Deserialize, Serialize};

use crate::domain::DailyAggregate;

/// Default rate at or above which a day counts as fully out of stock.
///
/// Slightly below 1.0 so that upstream summation error in the rate does not
/// turn a genuine 100% day into a miss.
pub const DEFAULT_THRESHOLD: f64 = 0.999;

/// Maps an out-of-stock rate to the full-stockout flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockoutClassifier {
    threshold: f64,
}

impl StockoutClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `true` iff `rate >= threshold`. An undefined rate is never a stockout.
    pub fn classify_rate(&self, rate: Option<f64>) -> bool {
        match rate {
            Some(r) => r >= self.threshold,
            None => false,
        }
    }

    pub fn classify(&self, aggregate: &DailyAggregate) -> bool {
        self.classify_rate(aggregate.oos_rate())
    }
}

impl Default for StockoutClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn threshold_boundary() {
        let c = StockoutClassifier::default();
        assert!(c.classify_rate(Some(0.9991)));
        assert!(!c.classify_rate(Some(0.9989)));
        assert!(c.classify_rate(Some(DEFAULT_THRESHOLD)));
        assert!(c.classify_rate(Some(1.0)));
    }

    #[test]
    fn undefined_rate_is_not_a_stockout() {
        let c = StockoutClassifier::default();
        assert!(!c.classify_rate(None));

        let empty = DailyAggregate::new(
            "S",
            "P",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            0,
            0,
        );
        assert!(!c.classify(&empty));
    }

    #[test]
    fn custom_threshold_is_respected() {
        let c = StockoutClassifier::new(0.5);
        assert!(c.classify_rate(Some(0.5)));
        assert!(!c.classify_rate(Some(0.49)));
    }

    #[test]
    fn classifies_from_counts() {
        let c = StockoutClassifier::default();
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(c.classify(&DailyAggregate::new("S", "P", date, 12, 12)));
        assert!(!c.classify(&DailyAggregate::new("S", "P", date, 11, 12)));
    }
}
