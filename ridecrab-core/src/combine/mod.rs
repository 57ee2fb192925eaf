//! # Combine functions
//!
//! Incremental per-key aggregation expressed as a small set of operations
//! over an accumulator type, rather than a class hierarchy.
//!
//! - [`CombineFn`]: `create_accumulator` / `add_input` / `merge` / `extract_output`
//! - [`LatestByTimestamp`]: keep the input with the greatest event time

use crate::types::EventTime;

mod latest;

pub use latest::*;

#[cfg(test)]
#[path = "tests/combine_tests.rs"]
mod tests;

/// Incremental aggregation function.
///
/// The accumulator is updated on each incoming element, so only `O(1)` state
/// is kept per window. Partial accumulators built on different workers are
/// reconciled with [`merge`](Self::merge); implementations must make merge
/// associative and commutative so that any parallel decomposition yields the
/// same result.
pub trait CombineFn<IN, ACC, OUT>: Send {
    /// Create an accumulator that has observed nothing.
    fn create_accumulator(&self) -> ACC;

    /// Fold one element into the accumulator.
    fn add_input(&self, acc: &mut ACC, input: &IN);

    /// Merge `other` into `acc`.
    fn merge(&self, acc: &mut ACC, other: ACC);

    /// Fold a collection of accumulators down to one.
    fn merge_accumulators<I>(&self, accs: I) -> ACC
    where
        I: IntoIterator<Item = ACC>,
        Self: Sized,
    {
        let mut merged = self.create_accumulator();
        for acc in accs {
            self.merge(&mut merged, acc);
        }
        merged
    }

    /// Read the current result out of the accumulator.
    ///
    /// Returns `None` when the accumulator has observed nothing. The
    /// accumulator is left intact so accumulating panes can fire repeatedly.
    fn extract_output(&self, acc: &ACC) -> Option<OUT>;
}
