//! # Ride position records
//!
//! The concrete record type the engine was built for: one position update of
//! a taxi ride, deduplicated per ride into its latest known position.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::combine::{Latest, LatestByTimestamp, LatestCandidate};
use crate::config::WindowConfig;
use crate::types::EventTime;
use crate::window::SessionAggregator;

/// One ride position update.
///
/// Everything apart from `ride_id` and `timestamp` is payload: carried
/// through aggregation untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidePoint {
    /// `None` (or empty) marks a record that cannot be attributed to a ride.
    pub ride_id: Option<String>,
    /// Event time in milliseconds since epoch.
    pub timestamp: EventTime,
    pub latitude: f64,
    pub longitude: f64,
    pub meter_reading: f64,
    pub meter_increment: f64,
    pub ride_status: String,
    pub passenger_count: u32,
}

impl RidePoint {
    pub fn new(ride_id: impl Into<String>, timestamp: EventTime) -> Self {
        Self {
            ride_id: Some(ride_id.into()),
            ..Self::unidentified(timestamp)
        }
    }

    /// A position update with no ride identifier.
    pub fn unidentified(timestamp: EventTime) -> Self {
        Self {
            ride_id: None,
            timestamp,
            latitude: 0.0,
            longitude: 0.0,
            meter_reading: 0.0,
            meter_increment: 0.0,
            ride_status: String::new(),
            passenger_count: 0,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_meter(mut self, reading: f64, increment: f64) -> Self {
        self.meter_reading = reading;
        self.meter_increment = increment;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>, passenger_count: u32) -> Self {
        self.ride_status = status.into();
        self.passenger_count = passenger_count;
        self
    }

    /// The grouping key: the ride identifier, if usable.
    pub fn ride_key(&self) -> Option<String> {
        self.ride_id.clone().filter(|id| !id.is_empty())
    }
}

impl LatestCandidate for RidePoint {
    fn event_time(&self) -> EventTime {
        self.timestamp
    }

    fn is_identified(&self) -> bool {
        self.ride_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

pub type RideKeyFn = fn(&RidePoint) -> Option<String>;
pub type RideTimestampFn = fn(&RidePoint) -> EventTime;

/// Session-windowed "latest position per ride" engine.
pub type LatestRidesAggregator = SessionAggregator<
    String,
    RidePoint,
    Latest<RidePoint>,
    RidePoint,
    RideKeyFn,
    RideTimestampFn,
    LatestByTimestamp,
>;

/// Build the latest-position engine keyed by ride id.
///
/// # Example
/// ```
/// use ridecrab_core::config::WindowConfig;
/// use ridecrab_core::ride::{RidePoint, latest_rides};
/// use ridecrab_core::types::StreamElement;
///
/// let mut engine = latest_rides(&WindowConfig::default()).unwrap();
/// for ts in [0, 10_000, 5_000] {
///     engine.process(StreamElement::record(RidePoint::new("r1", ts))).unwrap();
/// }
/// let out = engine.process(StreamElement::End).unwrap();
/// let latest = out.iter().find_map(|e| e.as_record()).unwrap();
/// assert_eq!(latest.value.value.timestamp, 10_000);
/// ```
pub fn latest_rides(config: &WindowConfig) -> Result<LatestRidesAggregator> {
    SessionAggregator::new(
        RidePoint::ride_key as RideKeyFn,
        ride_timestamp as RideTimestampFn,
        config,
        LatestByTimestamp,
    )
}

fn ride_timestamp(point: &RidePoint) -> EventTime {
    point.timestamp
}
