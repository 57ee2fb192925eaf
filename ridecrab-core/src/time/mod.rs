//! # Event-time progress and window timers
//!
//! - [`BoundedOutOfOrderness`]: derives watermarks from the event times seen
//!   so far, and [`watermarked`] wraps a value sequence into the element
//!   stream the engine consumes.
//! - [`WindowTimers`]: the engine's pending final and early firings.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{EventTime, StreamElement, Watermark};
use crate::window::TimeWindow;

mod timers;
mod watermark;

pub use timers::*;
pub use watermark::*;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
