//! Domain types for stockout persistence analysis

pub mod aggregate;
pub mod run;
pub mod summary;

pub use aggregate::{DailyAggregate, FlaggedDay, GroupKey};
pub use run::Run;
pub use summary::StreakSummary;
