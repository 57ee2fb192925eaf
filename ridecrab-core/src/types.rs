use serde::{Deserialize, Serialize};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// A record in the stream, carrying user data and optional event time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRecord<T> {
    pub value: T,
    pub timestamp: Option<EventTime>,
}

impl<T> StreamRecord<T> {
    /// Create a record with no event time.
    pub fn new(value: T) -> Self {
        Self {
            value,
            timestamp: None,
        }
    }

    /// Create a record with an explicit event time.
    pub fn with_timestamp(value: T, timestamp: EventTime) -> Self {
        Self {
            value,
            timestamp: Some(timestamp),
        }
    }
}

/// Watermark indicates that no elements with timestamp <= this value will arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// The unit flowing into and out of the aggregation engine: data records,
/// watermarks, and the end-of-input marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StreamElement<T> {
    /// User data record.
    Record(StreamRecord<T>),
    /// Watermark for event time progress tracking.
    Watermark(Watermark),
    /// End of bounded stream.
    End,
}

impl<T> StreamElement<T> {
    /// Create a record element with no timestamp.
    pub fn record(value: T) -> Self {
        Self::Record(StreamRecord::new(value))
    }

    /// Create a record element with a timestamp.
    pub fn timestamped_record(value: T, timestamp: EventTime) -> Self {
        Self::Record(StreamRecord::with_timestamp(value, timestamp))
    }

    /// Create a watermark element.
    pub fn watermark(timestamp: EventTime) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }

    /// Return the record payload, if this element is a record.
    pub fn as_record(&self) -> Option<&StreamRecord<T>> {
        match self {
            Self::Record(rec) => Some(rec),
            _ => None,
        }
    }
}

/// Trait bound for types that can flow through the stream.
/// All user data types must satisfy this.
pub trait StreamData: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

// Blanket implementation: any type satisfying the bounds is StreamData.
impl<T> StreamData for T where T: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_element_record() {
        let elem = StreamElement::record(42i32);
        match &elem {
            StreamElement::Record(rec) => {
                assert_eq!(rec.value, 42);
                assert_eq!(rec.timestamp, None);
            }
            _ => panic!("expected Record"),
        }
    }

    #[test]
    fn test_stream_element_watermark() {
        let elem = StreamElement::<i32>::watermark(1000);
        match elem {
            StreamElement::Watermark(wm) => assert_eq!(wm.timestamp, 1000),
            _ => panic!("expected Watermark"),
        }
    }

    #[test]
    fn test_as_record_skips_control_elements() {
        assert!(StreamElement::<i32>::watermark(5).as_record().is_none());
        assert!(StreamElement::<i32>::End.as_record().is_none());
        let elem = StreamElement::timestamped_record("ride", 7);
        assert_eq!(elem.as_record().map(|r| r.timestamp), Some(Some(7)));
    }

    #[test]
    fn test_watermark_ordering() {
        assert!(Watermark::new(1) < Watermark::new(2));
        assert_eq!(Watermark::new(3).max(Watermark::new(1)), Watermark::new(3));
    }

    #[test]
    fn test_stream_data_trait() {
        // Verify common types satisfy StreamData.
        fn assert_stream_data<T: StreamData>() {}
        assert_stream_data::<i32>();
        assert_stream_data::<String>();
        assert_stream_data::<(String, i64)>();
        assert_stream_data::<Option<String>>();
    }
}
