//! Run-length segmentation of flagged daily records.
//!
//! The segmenter is an explicit state machine over records sorted by
//! `(group, date)`. State is the currently open run (`flag`, start, length);
//! a record whose flag or group differs from the open run closes it.
//!
//! Adjacency is record order, not calendar continuity: a missing snapshot day
//! between two same-flag records does not break the run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{GroupKey, Run};

/// Input violated the `(group, date)` strictly-ascending precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderingError {
    #[error("group '{key}': date {current} does not follow {previous} (duplicate or out of order)")]
    NonIncreasingDate {
        key: GroupKey,
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("group '{key}' arrived after group '{previous}'; input is not sorted by group")]
    GroupOutOfOrder { previous: GroupKey, key: GroupKey },
}

impl OrderingError {
    /// The group whose records broke the ordering contract.
    pub fn key(&self) -> &GroupKey {
        match self {
            OrderingError::NonIncreasingDate { key, .. } => key,
            OrderingError::GroupOutOfOrder { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenRun {
    key: GroupKey,
    run_id: usize,
    flag: bool,
    start: NaiveDate,
    end: NaiveDate,
    length: usize,
}

impl OpenRun {
    fn close(self) -> Run {
        Run {
            key: self.key,
            run_id: self.run_id,
            is_full_oos: self.flag,
            start_date: self.start,
            end_date: self.end,
            length: self.length,
        }
    }
}

/// Outcome of feeding one record to the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Run id (1-based within the group) the record was assigned to.
    pub run_id: usize,
    /// Run completed by this record's arrival, if any.
    pub closed: Option<Run>,
}

/// Streaming run segmenter.
#[derive(Debug, Default)]
pub struct RunSegmenter {
    open: Option<OpenRun>,
}

impl RunSegmenter {
    pub fn new() -> Self {
        Self { open: None }
    }

    /// Feed the next record in `(group, date)` order.
    ///
    /// A group change behaves exactly like a flag change: the open run is
    /// emitted and run numbering restarts at 1.
    pub fn push(
        &mut self,
        key: &GroupKey,
        date: NaiveDate,
        flag: bool,
    ) -> Result<Step, OrderingError> {
        let Some(open) = self.open.as_mut() else {
            self.open = Some(Self::start(key.clone(), 1, flag, date));
            return Ok(Step {
                run_id: 1,
                closed: None,
            });
        };

        if open.key == *key {
            if date <= open.end {
                return Err(OrderingError::NonIncreasingDate {
                    key: key.clone(),
                    previous: open.end,
                    current: date,
                });
            }
            if open.flag == flag {
                open.end = date;
                open.length += 1;
                return Ok(Step {
                    run_id: open.run_id,
                    closed: None,
                });
            }
            let next_id = open.run_id + 1;
            let closed = self.open.replace(Self::start(key.clone(), next_id, flag, date));
            return Ok(Step {
                run_id: next_id,
                closed: closed.map(OpenRun::close),
            });
        }

        if *key < open.key {
            return Err(OrderingError::GroupOutOfOrder {
                previous: open.key.clone(),
                key: key.clone(),
            });
        }

        let closed = self.open.replace(Self::start(key.clone(), 1, flag, date));
        Ok(Step {
            run_id: 1,
            closed: closed.map(OpenRun::close),
        })
    }

    /// Emit the run still open at end of input.
    pub fn finish(&mut self) -> Option<Run> {
        self.open.take().map(OpenRun::close)
    }

    fn start(key: GroupKey, run_id: usize, flag: bool, date: NaiveDate) -> OpenRun {
        OpenRun {
            key,
            run_id,
            flag,
            start: date,
            end: date,
            length: 1,
        }
    }
}

/// Segment one group's ascending `(date, flag)` series into maximal runs.
pub fn segment_group(
    key: &GroupKey,
    days: &[(NaiveDate, bool)],
) -> Result<Vec<Run>, OrderingError> {
    let mut segmenter = RunSegmenter::new();
    let mut runs = Vec::new();
    for &(date, flag) in days {
        if let Some(run) = segmenter.push(key, date, flag)?.closed {
            runs.push(run);
        }
    }
    runs.extend(segmenter.finish());
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> GroupKey {
        GroupKey::new("Hongdae", "E465185")
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, n).unwrap()
    }

    fn series(flags: &[bool]) -> Vec<(NaiveDate, bool)> {
        flags
            .iter()
            .enumerate()
            .map(|(i, &f)| (day(i as u32 + 1), f))
            .collect()
    }

    fn shape(runs: &[Run]) -> Vec<(bool, usize)> {
        runs.iter().map(|r| (r.is_full_oos, r.length)).collect()
    }

    #[test]
    fn empty_series_has_no_runs() {
        assert!(segment_group(&key(), &[]).unwrap().is_empty());
    }

    #[test]
    fn all_true_is_one_run() {
        let runs = segment_group(&key(), &series(&[true; 7])).unwrap();
        assert_eq!(shape(&runs), vec![(true, 7)]);
        assert_eq!(runs[0].start_date, day(1));
        assert_eq!(runs[0].end_date, day(7));
    }

    #[test]
    fn mixed_flags_alternate() {
        let runs =
            segment_group(&key(), &series(&[true, true, false, true, true, true])).unwrap();
        assert_eq!(shape(&runs), vec![(true, 2), (false, 1), (true, 3)]);
        assert_eq!(
            runs.iter().map(|r| r.run_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(runs[2].start_date, day(4));
        assert_eq!(runs[2].end_date, day(6));
    }

    #[test]
    fn missing_day_does_not_break_run() {
        let days = vec![(day(1), true), (day(2), true), (day(4), true), (day(5), true)];
        let runs = segment_group(&key(), &days).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].length, 4);
        assert_eq!(runs[0].start_date, day(1));
        assert_eq!(runs[0].end_date, day(5));
    }

    #[test]
    fn duplicate_date_is_an_ordering_error() {
        let days = vec![(day(1), true), (day(1), false)];
        let err = segment_group(&key(), &days).unwrap_err();
        assert_eq!(
            err,
            OrderingError::NonIncreasingDate {
                key: key(),
                previous: day(1),
                current: day(1),
            }
        );
    }

    #[test]
    fn backwards_date_is_an_ordering_error() {
        let days = vec![(day(3), false), (day(2), false)];
        assert!(matches!(
            segment_group(&key(), &days),
            Err(OrderingError::NonIncreasingDate { .. })
        ));
    }

    #[test]
    fn group_change_closes_run_and_resets_ids() {
        let a = GroupKey::new("A", "1");
        let b = GroupKey::new("A", "2");
        let mut seg = RunSegmenter::new();

        assert_eq!(seg.push(&a, day(1), true).unwrap().run_id, 1);
        assert_eq!(seg.push(&a, day(2), false).unwrap().run_id, 2);

        // Same flag, but a new group: the open run must still close.
        let step = seg.push(&b, day(1), false).unwrap();
        assert_eq!(step.run_id, 1);
        let closed = step.closed.unwrap();
        assert_eq!(closed.key, a);
        assert_eq!(closed.run_id, 2);

        let last = seg.finish().unwrap();
        assert_eq!(last.key, b);
        assert_eq!(last.length, 1);
        assert!(seg.finish().is_none());
    }

    #[test]
    fn earlier_group_after_later_is_rejected() {
        let mut seg = RunSegmenter::new();
        seg.push(&GroupKey::new("B", "1"), day(1), true).unwrap();
        let err = seg.push(&GroupKey::new("A", "1"), day(2), true).unwrap_err();
        assert!(matches!(err, OrderingError::GroupOutOfOrder { .. }));
        assert_eq!(err.key(), &GroupKey::new("A", "1"));
    }
}
