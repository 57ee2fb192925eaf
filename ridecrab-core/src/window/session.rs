use super::*;

/// Gap-based windows: a session lasts while consecutive events of a key are
/// less than `gap` apart.
///
/// Each element initially gets the window `[timestamp, timestamp + gap)`.
/// Overlapping windows of the same key are merged, so a session always spans
/// `[earliest, latest + gap)`. An element exactly `gap` after the latest one
/// does not overlap and opens a new session.
#[derive(Debug, Clone, Copy)]
pub struct SessionWindows {
    gap_ms: i64,
}

impl SessionWindows {
    /// Create session windows with the given gap in milliseconds.
    pub fn with_gap_ms(gap_ms: i64) -> Self {
        Self { gap_ms }
    }

    /// The proto-window of an element before merging.
    pub fn assign_window(&self, timestamp: EventTime) -> TimeWindow {
        TimeWindow::new(timestamp, timestamp.saturating_add(self.gap_ms))
    }

    /// Find the sessions among `existing` that `window` must merge with.
    ///
    /// Returns the indices of all intersecting windows and the window that
    /// covers them together with `window`. Because open sessions of one key
    /// never overlap each other, a single pass is enough.
    pub fn merge_candidates(
        &self,
        existing: &[TimeWindow],
        window: TimeWindow,
    ) -> (Vec<usize>, TimeWindow) {
        let mut merged = window;
        let mut indices = Vec::new();
        for (i, candidate) in existing.iter().enumerate() {
            if candidate.intersects(&window) {
                merged = merged.cover(candidate);
                indices.push(i);
            }
        }
        (indices, merged)
    }
}
