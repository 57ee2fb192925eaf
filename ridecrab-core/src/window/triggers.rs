use super::*;

// ── TriggerResult ─────────────────────────────────────────────────────────────

/// What the engine should do with a window after a trigger callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    /// Keep accumulating; emit nothing.
    Continue,
    /// Emit the accumulated state and keep the window open.
    Fire,
    /// Emit the accumulated state, then discard the window.
    FireAndPurge,
}

impl TriggerResult {
    /// Return true if the accumulator should be extracted and emitted.
    pub fn is_fire(self) -> bool {
        matches!(self, TriggerResult::Fire | TriggerResult::FireAndPurge)
    }

    /// Return true if the window state should be discarded after this result.
    pub fn is_purge(self) -> bool {
        matches!(self, TriggerResult::FireAndPurge)
    }
}

// ── WindowPhase ───────────────────────────────────────────────────────────────

/// Speculative-firing progress of an open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarlyFiring {
    /// Early firing is not configured.
    Disabled,
    /// An early pane is due once processing time reaches `fire_at`.
    Pending { fire_at: EventTime },
    /// The single early pane has been emitted.
    Fired,
}

/// Lifecycle of one (key, window).
///
/// `Open` accepts records and may emit at most one early pane. `Closed` is
/// terminal: the final pane has been emitted and no callback fires again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPhase {
    Open { early: EarlyFiring },
    Closed,
}

impl WindowPhase {
    pub fn is_open(&self) -> bool {
        matches!(self, WindowPhase::Open { .. })
    }

    /// Processing time at which an early pane is due, if one is pending.
    pub fn early_fire_at(&self) -> Option<EventTime> {
        match self {
            WindowPhase::Open {
                early: EarlyFiring::Pending { fire_at },
            } => Some(*fire_at),
            _ => None,
        }
    }
}

// ── EarlyAndFinalTrigger ──────────────────────────────────────────────────────

/// Fires a window speculatively once, a fixed processing-time delay after its
/// first element, and finally once the watermark passes the window's end plus
/// the allowed lateness.
///
/// The trigger holds no clock. Processing time and event time are handed in
/// by the engine, which keeps firings deterministic under test.
#[derive(Debug, Clone, Copy)]
pub struct EarlyAndFinalTrigger {
    early_delay_ms: Option<i64>,
    allowed_lateness_ms: i64,
}

impl EarlyAndFinalTrigger {
    pub fn new(early_delay_ms: Option<i64>, allowed_lateness_ms: i64) -> Self {
        Self {
            early_delay_ms,
            allowed_lateness_ms,
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.early_firing_delay_ms(), config.allowed_lateness_ms())
    }

    /// Phase of a window whose first element lands at `processing_time`.
    pub fn open(&self, processing_time: EventTime) -> WindowPhase {
        let early = match self.early_delay_ms {
            Some(delay) => EarlyFiring::Pending {
                fire_at: processing_time.saturating_add(delay),
            },
            None => EarlyFiring::Disabled,
        };
        WindowPhase::Open { early }
    }

    /// Event time at which `window` emits its final pane and closes.
    pub fn final_fire_time(&self, window: &TimeWindow) -> EventTime {
        window
            .max_timestamp()
            .saturating_add(self.allowed_lateness_ms)
    }

    /// True if `window` would already have closed at `watermark`. Records
    /// landing only in such a window are too late to be admitted.
    pub fn is_expired(&self, window: &TimeWindow, watermark: EventTime) -> bool {
        watermark >= self.final_fire_time(window)
    }

    /// Processing time advanced to `now`.
    pub fn on_processing_time(&self, phase: &mut WindowPhase, now: EventTime) -> TriggerResult {
        match phase.early_fire_at() {
            Some(fire_at) if now >= fire_at => {
                *phase = WindowPhase::Open {
                    early: EarlyFiring::Fired,
                };
                TriggerResult::Fire
            }
            _ => TriggerResult::Continue,
        }
    }

    /// Event time advanced to `event_time`.
    pub fn on_event_time(
        &self,
        phase: &mut WindowPhase,
        window: &TimeWindow,
        event_time: EventTime,
    ) -> TriggerResult {
        if phase.is_open() && self.is_expired(window, event_time) {
            *phase = WindowPhase::Closed;
            TriggerResult::FireAndPurge
        } else {
            TriggerResult::Continue
        }
    }

    /// Phase of a window produced by merging open windows.
    ///
    /// If any constituent already emitted its early pane the merged window
    /// does not emit another; otherwise the earliest pending deadline wins.
    pub fn merge_phases<I>(&self, phases: I) -> WindowPhase
    where
        I: IntoIterator<Item = WindowPhase>,
    {
        let mut fired = false;
        let mut earliest: Option<EventTime> = None;
        for phase in phases {
            match phase {
                WindowPhase::Open {
                    early: EarlyFiring::Fired,
                } => fired = true,
                WindowPhase::Open {
                    early: EarlyFiring::Pending { fire_at },
                } => earliest = Some(earliest.map_or(fire_at, |e| e.min(fire_at))),
                _ => {}
            }
        }

        let early = if fired {
            EarlyFiring::Fired
        } else if let Some(fire_at) = earliest {
            EarlyFiring::Pending { fire_at }
        } else {
            EarlyFiring::Disabled
        };
        WindowPhase::Open { early }
    }
}
