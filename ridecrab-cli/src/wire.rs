//! JSON-lines wire format for ride position updates.
//!
//! ```text
//! {"ride_id":"a60ba4d8-...","point_idx":82,"latitude":40.66684,"longitude":-73.83163,
//!  "timestamp":"2016-08-31T11:04:02.025396463-04:00","meter_reading":14.270274,
//!  "meter_increment":0.019336415,"ride_status":"enroute","passenger_count":2}
//! ```

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use ridecrab_core::ride::RidePoint;
use ridecrab_core::window::{Pane, PaneTiming};
use serde::{Deserialize, Serialize};

/// One ride message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideMessage {
    #[serde(default)]
    pub ride_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_idx: Option<u64>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// RFC 3339, any offset, up to nanosecond precision.
    pub timestamp: String,
    #[serde(default)]
    pub meter_reading: f64,
    #[serde(default)]
    pub meter_increment: f64,
    #[serde(default)]
    pub ride_status: String,
    #[serde(default)]
    pub passenger_count: u32,
}

impl RideMessage {
    pub fn parse_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("malformed ride message")
    }

    /// Event time in milliseconds since epoch.
    pub fn event_time(&self) -> Result<i64> {
        let parsed = DateTime::parse_from_rfc3339(&self.timestamp)
            .with_context(|| format!("bad timestamp {:?}", self.timestamp))?;
        Ok(parsed.timestamp_millis())
    }

    pub fn to_point(&self) -> Result<RidePoint> {
        Ok(RidePoint {
            ride_id: self.ride_id.clone(),
            timestamp: self.event_time()?,
            latitude: self.latitude,
            longitude: self.longitude,
            meter_reading: self.meter_reading,
            meter_increment: self.meter_increment,
            ride_status: self.ride_status.clone(),
            passenger_count: self.passenger_count,
        })
    }

    pub fn from_point(point: &RidePoint) -> Result<Self> {
        Ok(Self {
            ride_id: point.ride_id.clone(),
            point_idx: None,
            latitude: point.latitude,
            longitude: point.longitude,
            timestamp: format_millis(point.timestamp)?,
            meter_reading: point.meter_reading,
            meter_increment: point.meter_increment,
            ride_status: point.ride_status.clone(),
            passenger_count: point.passenger_count,
        })
    }
}

/// A ride emitted by the engine, annotated with the pane that produced it.
#[derive(Debug, Serialize)]
pub struct PaneLine {
    #[serde(flatten)]
    pub ride: RideMessage,
    pub timing: &'static str,
    pub pane_index: u32,
    pub window_start: String,
    pub window_end: String,
}

impl PaneLine {
    pub fn from_pane(pane: &Pane<RidePoint>) -> Result<Self> {
        Ok(Self {
            ride: RideMessage::from_point(&pane.value)?,
            timing: match pane.timing {
                PaneTiming::Early => "early",
                PaneTiming::Final => "final",
            },
            pane_index: pane.index,
            window_start: format_millis(pane.window.start)?,
            window_end: format_millis(pane.window.end)?,
        })
    }
}

fn format_millis(ms: i64) -> Result<String> {
    let time: DateTime<Utc> =
        DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp {ms} out of range"))?;
    Ok(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridecrab_core::window::TimeWindow;

    const SAMPLE: &str = r#"{"ride_id":"a60ba4d8-1501-4b5b-93ee-b7864304d0e0","point_idx":82,"latitude":40.66684000000033,"longitude":-73.83163000000001,"timestamp":"2016-08-31T11:04:02.025396463-04:00","meter_reading":14.270274,"meter_increment":0.019336415,"ride_status":"enroute","passenger_count":2}"#;

    #[test]
    fn test_parse_sample_message() {
        let msg = RideMessage::parse_line(SAMPLE).unwrap();
        assert_eq!(
            msg.ride_id.as_deref(),
            Some("a60ba4d8-1501-4b5b-93ee-b7864304d0e0")
        );
        assert_eq!(msg.point_idx, Some(82));
        assert_eq!(msg.ride_status, "enroute");
        assert_eq!(msg.passenger_count, 2);

        let point = msg.to_point().unwrap();
        // 2016-08-31T15:04:02.025Z
        assert_eq!(point.timestamp, 1_472_655_842_025);
        assert_eq!(point.meter_reading, 14.270274);
    }

    #[test]
    fn test_missing_ride_id_is_unidentified() {
        let msg = RideMessage::parse_line(r#"{"timestamp":"2016-08-31T15:04:02Z"}"#).unwrap();
        let point = msg.to_point().unwrap();
        assert_eq!(point.ride_id, None);
        assert_eq!(point.ride_key(), None);
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(RideMessage::parse_line("not json").is_err());
        assert!(RideMessage::parse_line(r#"{"ride_id":"r1"}"#).is_err());

        let bad_time = RideMessage::parse_line(r#"{"ride_id":"r1","timestamp":"yesterday"}"#).unwrap();
        assert!(bad_time.to_point().is_err());
    }

    #[test]
    fn test_from_point_formats_utc_millis() {
        let point = RidePoint::new("r1", 1_472_655_842_025).with_status("dropoff", 1);
        let msg = RideMessage::from_point(&point).unwrap();
        assert_eq!(msg.timestamp, "2016-08-31T15:04:02.025Z");
        assert_eq!(msg.to_point().unwrap(), point);
    }

    #[test]
    fn test_pane_line_flattens_ride_fields() {
        let pane = Pane {
            value: RidePoint::new("r1", 0),
            window: TimeWindow::new(0, 3_600_000),
            timing: PaneTiming::Final,
            index: 1,
        };
        let json = serde_json::to_value(PaneLine::from_pane(&pane).unwrap()).unwrap();
        assert_eq!(json["ride_id"], "r1");
        assert_eq!(json["timing"], "final");
        assert_eq!(json["pane_index"], 1);
        assert_eq!(json["window_start"], "1970-01-01T00:00:00.000Z");
        assert_eq!(json["window_end"], "1970-01-01T01:00:00.000Z");
    }
}
