use serde::{Deserialize, Serialize};

use super::*;

/// A value that can compete for "latest observed".
pub trait LatestCandidate: Clone {
    /// Event time used to order candidates.
    fn event_time(&self) -> EventTime;

    /// Whether the value carries an identifier. Unidentified values are
    /// treated as "no observation" and never replace a held value.
    fn is_identified(&self) -> bool {
        true
    }
}

/// Accumulator holding at most one value: the latest seen so far.
///
/// Once non-empty, the held value's event time is `>=` the event time of
/// every value folded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Latest<T> {
    held: Option<T>,
}

impl<T> Latest<T> {
    /// The sentinel accumulator.
    pub fn empty() -> Self {
        Self { held: None }
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    pub fn held(&self) -> Option<&T> {
        self.held.as_ref()
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: LatestCandidate> Latest<T> {
    /// Replace the held value if `candidate` is strictly newer.
    ///
    /// Equal event times keep the held value.
    fn offer(&mut self, candidate: T) {
        if !candidate.is_identified() {
            return;
        }
        let newer = match &self.held {
            None => true,
            Some(held) => candidate.event_time() > held.event_time(),
        };
        if newer {
            self.held = Some(candidate);
        }
    }
}

/// "Latest wins" combine: a max-by-event-time monoid.
///
/// Ties are broken in favour of whatever the accumulator already holds, so
/// for inputs folded with [`add_input`](CombineFn::add_input) the first value
/// seen at a given event time wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestByTimestamp;

impl<T> CombineFn<T, Latest<T>, T> for LatestByTimestamp
where
    T: LatestCandidate + Send,
{
    fn create_accumulator(&self) -> Latest<T> {
        Latest::empty()
    }

    fn add_input(&self, acc: &mut Latest<T>, input: &T) {
        acc.offer(input.clone());
    }

    fn merge(&self, acc: &mut Latest<T>, other: Latest<T>) {
        if acc.is_empty() {
            *acc = other;
            return;
        }
        if let Some(candidate) = other.held {
            acc.offer(candidate);
        }
    }

    fn extract_output(&self, acc: &Latest<T>) -> Option<T> {
        acc.held().cloned()
    }
}
