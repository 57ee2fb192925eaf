//! Windowing configuration for the aggregation engine.

use std::time::Duration;

use anyhow::{Result, bail};

use crate::types::EventTime;

/// Session gap used when none is configured.
pub const DEFAULT_GAP: Duration = Duration::from_secs(60 * 60);

/// Processing-time delay before the speculative pane of a window.
pub const DEFAULT_EARLY_FIRING_DELAY: Duration = Duration::from_millis(2_000);

/// Options recognized by [`SessionAggregator`](crate::window::SessionAggregator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    /// Session inactivity gap. Two records of the same key closer than this
    /// belong to the same session.
    pub gap: Duration,
    /// Processing-time delay after the first record of a window lands before
    /// a speculative pane is emitted. `None` disables early firing.
    pub early_firing_delay: Option<Duration>,
    /// Grace period after the watermark passes a window's end during which
    /// late records are still admitted.
    pub allowed_lateness: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            gap: DEFAULT_GAP,
            early_firing_delay: Some(DEFAULT_EARLY_FIRING_DELAY),
            allowed_lateness: Duration::ZERO,
        }
    }
}

impl WindowConfig {
    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    pub fn with_early_firing_delay(mut self, delay: Option<Duration>) -> Self {
        self.early_firing_delay = delay;
        self
    }

    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness = lateness;
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.gap.is_zero() {
            bail!("session gap must be greater than zero");
        }
        if self.gap.as_millis() > EventTime::MAX as u128 {
            bail!("session gap {:?} does not fit in event time", self.gap);
        }
        Ok(())
    }

    pub(crate) fn gap_ms(&self) -> EventTime {
        duration_ms(self.gap)
    }

    pub(crate) fn early_firing_delay_ms(&self) -> Option<EventTime> {
        self.early_firing_delay.map(duration_ms)
    }

    pub(crate) fn allowed_lateness_ms(&self) -> EventTime {
        duration_ms(self.allowed_lateness)
    }
}

fn duration_ms(d: Duration) -> EventTime {
    EventTime::try_from(d.as_millis()).unwrap_or(EventTime::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ride_pipeline() {
        let config = WindowConfig::default();
        assert_eq!(config.gap_ms(), 3_600_000);
        assert_eq!(config.early_firing_delay_ms(), Some(2_000));
        assert_eq!(config.allowed_lateness_ms(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_gap_rejected() {
        let config = WindowConfig::default().with_gap(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn test_builder_setters() {
        let config = WindowConfig::default()
            .with_gap(Duration::from_millis(60))
            .with_early_firing_delay(None)
            .with_allowed_lateness(Duration::from_millis(15));
        assert_eq!(config.gap_ms(), 60);
        assert_eq!(config.early_firing_delay_ms(), None);
        assert_eq!(config.allowed_lateness_ms(), 15);
    }
}
