//! This module contains the per-instruction visit accounting used by the
//! scheduler to bound exploration of cyclic control flow.

/// A per-instruction counter of how many work items the scheduler has
/// processed at each index.
///
/// The counter exists purely as a termination backstop: monotone joins and
/// subsumption make well-behaved programs converge long before any limit is
/// reached, and hitting the limit aborts the run rather than erroring.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VisitCounts {
    /// The number of times each instruction index has been processed.
    counts: Vec<usize>,

    /// The maximum number of times any single index may be processed.
    limit: usize,
}

impl VisitCounts {
    /// Constructs counters for a program of `len` instructions, each allowed
    /// `limit` visits.
    #[must_use]
    pub fn new(len: usize, limit: usize) -> Self {
        Self {
            counts: vec![0; len],
            limit,
        }
    }

    /// Records a visit to `index`, returning whether the visit is still
    /// within the limit.
    ///
    /// An out-of-range index is not counted; the dispatcher is the place
    /// that rejects it with a proper located error.
    pub fn record(&mut self, index: u32) -> bool {
        match self.counts.get_mut(index as usize) {
            Some(count) => {
                *count += 1;
                *count <= self.limit
            }
            None => true,
        }
    }

    /// Gets the number of recorded visits to `index`.
    #[must_use]
    pub fn count(&self, index: u32) -> usize {
        self.counts.get(index as usize).copied().unwrap_or(0)
    }
}
