//! Result aggregation.
//!
//! Results are appended in dispatch order, which mirrors collection traversal
//! order so two runs can be diffed line by line. Counts are computed once, when
//! the set is finished.

use crate::models::{RequestResult, ResultSet};

/// Accumulates per-request results.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<RequestResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: RequestResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Closes the aggregation and computes the summary counts.
    ///
    /// # Arguments
    ///
    /// * `aborted` - Whether the run stopped before every request was attempted
    pub fn finish(self, aborted: bool) -> ResultSet {
        let succeeded = self.results.iter().filter(|r| r.success).count();
        let total = self.results.len();

        ResultSet {
            requests: self.results,
            total,
            succeeded,
            failed: total - succeeded,
            aborted,
        }
    }
}

/// Collects a sequence of results into a finished set.
pub fn collect<I>(results: I) -> ResultSet
where
    I: IntoIterator<Item = RequestResult>,
{
    let mut aggregator = ResultAggregator::new();
    for result in results {
        aggregator.push(result);
    }
    aggregator.finish(false)
}
