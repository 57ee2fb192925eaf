use super::*;

/// Which clock a window timer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDomain {
    /// Advanced by watermarks; closes windows with their final pane.
    EventTime,
    /// Advanced by the caller's wall clock; drives early panes.
    ProcessingTime,
}

/// A pending firing of one (key, window).
///
/// Ordering puts `fire_at` first, so the earliest due timer pops first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowTimer {
    pub fire_at: EventTime,
    pub key_bytes: Vec<u8>,
    pub window: TimeWindow,
}

/// Final and early firings waiting on their clocks.
///
/// Timers leave a queue one at a time through [`pop_due`](Self::pop_due):
/// a caller that stops halfway through leaves every unhandled timer queued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowTimers {
    final_firings: BTreeSet<WindowTimer>,
    early_firings: BTreeSet<WindowTimer>,
}

impl WindowTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, domain: TimeDomain) -> &BTreeSet<WindowTimer> {
        match domain {
            TimeDomain::EventTime => &self.final_firings,
            TimeDomain::ProcessingTime => &self.early_firings,
        }
    }

    fn queue_mut(&mut self, domain: TimeDomain) -> &mut BTreeSet<WindowTimer> {
        match domain {
            TimeDomain::EventTime => &mut self.final_firings,
            TimeDomain::ProcessingTime => &mut self.early_firings,
        }
    }

    /// Schedule `window` of `key_bytes` to fire once `domain` reaches
    /// `fire_at`. Scheduling the same timer twice keeps one.
    pub fn schedule(
        &mut self,
        domain: TimeDomain,
        key_bytes: &[u8],
        window: TimeWindow,
        fire_at: EventTime,
    ) {
        self.queue_mut(domain).insert(WindowTimer {
            fire_at,
            key_bytes: key_bytes.to_vec(),
            window,
        });
    }

    /// Cancel a scheduled timer. Returns false if it was not pending.
    pub fn cancel(
        &mut self,
        domain: TimeDomain,
        key_bytes: &[u8],
        window: TimeWindow,
        fire_at: EventTime,
    ) -> bool {
        self.queue_mut(domain).remove(&WindowTimer {
            fire_at,
            key_bytes: key_bytes.to_vec(),
            window,
        })
    }

    /// Remove and return the earliest timer of `domain` due at `now`.
    pub fn pop_due(&mut self, domain: TimeDomain, now: EventTime) -> Option<WindowTimer> {
        let queue = self.queue_mut(domain);
        if queue.first()?.fire_at > now {
            return None;
        }
        queue.pop_first()
    }

    /// Drop every pending timer of `domain`.
    pub fn clear(&mut self, domain: TimeDomain) {
        self.queue_mut(domain).clear();
    }

    /// Number of timers of `domain` still waiting.
    pub fn pending(&self, domain: TimeDomain) -> usize {
        self.queue(domain).len()
    }
}
