//! Grouped streaming analysis for inputs already sorted by `(group, date)`.
//!
//! Only the current group's records are buffered, so peak memory is bounded by
//! the largest single group rather than the whole input. Each completed group
//! is handed back to the caller, or to a [`GroupSink`], as soon as the next
//! group starts.

use tracing::warn;

use crate::domain::{DailyAggregate, GroupKey};
use crate::pipeline::{analyze_group, AnalysisOptions, GroupAnalysis, OrderingPolicy};
use crate::segment::OrderingError;

/// Running counters for a streaming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub rows: usize,
    pub groups: usize,
    pub skipped: Vec<OrderingError>,
}

/// Incremental per-group analyzer.
#[derive(Debug)]
pub struct StreamingAnalyzer {
    opts: AnalysisOptions,
    current: Option<GroupKey>,
    buffer: Vec<DailyAggregate>,
    stats: StreamStats,
}

impl StreamingAnalyzer {
    pub fn new(opts: AnalysisOptions) -> Self {
        Self {
            opts,
            current: None,
            buffer: Vec::new(),
            stats: StreamStats::default(),
        }
    }

    /// Feed the next record. Returns the previous group's analysis when this
    /// record starts a new group.
    ///
    /// A group key that sorts before the current one means the input was not
    /// grouped; that is always fatal since earlier groups were already emitted.
    pub fn push(&mut self, record: DailyAggregate) -> Result<Option<GroupAnalysis>, OrderingError> {
        self.stats.rows += 1;

        if let Some(key) = &self.current {
            if *key == record.key {
                self.buffer.push(record);
                return Ok(None);
            }
            if record.key < *key {
                return Err(OrderingError::GroupOutOfOrder {
                    previous: key.clone(),
                    key: record.key,
                });
            }
        }

        let done = self.flush()?;
        self.current = Some(record.key.clone());
        self.buffer.push(record);
        Ok(done)
    }

    /// Close the last group and return it with the final counters.
    pub fn finish(mut self) -> Result<(Option<GroupAnalysis>, StreamStats), OrderingError> {
        let last = self.flush()?;
        Ok((last, self.stats))
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    fn flush(&mut self) -> Result<Option<GroupAnalysis>, OrderingError> {
        let Some(key) = self.current.take() else {
            return Ok(None);
        };
        let records = std::mem::take(&mut self.buffer);

        match analyze_group(&key, &records, &self.opts) {
            Ok(group) => {
                self.stats.groups += 1;
                Ok(Some(group))
            }
            Err(err) => match self.opts.on_ordering_error {
                OrderingPolicy::Fail => Err(err),
                OrderingPolicy::SkipGroup => {
                    warn!(group = %key, error = %err, "skipping group with ordering violation");
                    self.stats.skipped.push(err);
                    Ok(None)
                }
            },
        }
    }
}

/// Receives each finished group from a streaming pass.
pub trait GroupSink {
    type Error: From<OrderingError>;

    fn accept(&mut self, group: GroupAnalysis) -> Result<(), Self::Error>;
}

impl GroupSink for Vec<GroupAnalysis> {
    type Error = OrderingError;

    fn accept(&mut self, group: GroupAnalysis) -> Result<(), OrderingError> {
        self.push(group);
        Ok(())
    }
}

/// Drive a [`StreamingAnalyzer`] over fallible records, handing each finished
/// group to `sink`. Stops at the first record error, ordering error or sink
/// error.
pub fn stream_into<I, E, S>(
    records: I,
    opts: &AnalysisOptions,
    sink: &mut S,
) -> Result<StreamStats, S::Error>
where
    I: IntoIterator<Item = Result<DailyAggregate, E>>,
    S: GroupSink,
    S::Error: From<E>,
{
    let mut analyzer = StreamingAnalyzer::new(opts.clone());
    for record in records {
        if let Some(group) = analyzer.push(record?)? {
            sink.accept(group)?;
        }
    }
    let (last, stats) = analyzer.finish()?;
    if let Some(group) = last {
        sink.accept(group)?;
    }
    Ok(stats)
}

/// Stream an in-memory iterator, collecting every group.
pub fn analyze_sorted<I>(
    records: I,
    opts: &AnalysisOptions,
) -> Result<(Vec<GroupAnalysis>, StreamStats), OrderingError>
where
    I: IntoIterator<Item = DailyAggregate>,
{
    let mut groups = Vec::new();
    let stats = stream_into(
        records.into_iter().map(Ok::<_, OrderingError>),
        opts,
        &mut groups,
    )?;
    Ok((groups, stats))
}
