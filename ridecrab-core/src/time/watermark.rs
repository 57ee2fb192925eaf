use super::*;

/// Minimum possible event time. The engine's watermark before any arrives.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Maximum possible event time. Reaching it closes every window.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

/// Watermarks for a stream whose records trail the newest event time seen by
/// at most `max_delay`.
///
/// A watermark is produced only when it moves forward, so the sequence handed
/// to the engine never repeats or regresses.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ridecrab_core::time::BoundedOutOfOrderness;
///
/// let mut bound = BoundedOutOfOrderness::new(Duration::from_secs(5));
/// assert_eq!(bound.observe(12_000).map(|wm| wm.timestamp), Some(7_000));
/// // An older record does not move event time.
/// assert_eq!(bound.observe(9_000), None);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedOutOfOrderness {
    max_delay_ms: i64,
    max_seen: EventTime,
    emitted: EventTime,
}

impl BoundedOutOfOrderness {
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay_ms: i64::try_from(max_delay.as_millis()).unwrap_or(i64::MAX),
            max_seen: EVENT_TIME_MIN,
            emitted: EVENT_TIME_MIN,
        }
    }

    /// Note a record at `timestamp`; return the new watermark if it advanced.
    pub fn observe(&mut self, timestamp: EventTime) -> Option<Watermark> {
        self.max_seen = self.max_seen.max(timestamp);
        let candidate = self.max_seen.saturating_sub(self.max_delay_ms);
        if candidate <= self.emitted {
            return None;
        }
        self.emitted = candidate;
        Some(Watermark::new(candidate))
    }
}

/// Element stream built by [`watermarked`].
pub struct Watermarked<I, F> {
    values: I,
    timestamp_fn: F,
    bound: BoundedOutOfOrderness,
    pending: Option<Watermark>,
    finished: bool,
}

/// Turn a sequence of values into the elements the engine consumes: each
/// value as a timestamped record, followed by a watermark whenever the bound
/// lets event time advance, and a single `End` once the values run out.
pub fn watermarked<I, T, F>(
    values: I,
    max_delay: Duration,
    timestamp_fn: F,
) -> Watermarked<I::IntoIter, F>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> EventTime,
{
    Watermarked {
        values: values.into_iter(),
        timestamp_fn,
        bound: BoundedOutOfOrderness::new(max_delay),
        pending: None,
        finished: false,
    }
}

impl<I, T, F> Iterator for Watermarked<I, F>
where
    I: Iterator<Item = T>,
    F: FnMut(&T) -> EventTime,
{
    type Item = StreamElement<T>;

    fn next(&mut self) -> Option<StreamElement<T>> {
        if let Some(wm) = self.pending.take() {
            return Some(StreamElement::Watermark(wm));
        }
        if self.finished {
            return None;
        }
        match self.values.next() {
            Some(value) => {
                let ts = (self.timestamp_fn)(&value);
                self.pending = self.bound.observe(ts);
                Some(StreamElement::timestamped_record(value, ts))
            }
            None => {
                self.finished = true;
                Some(StreamElement::End)
            }
        }
    }
}
