//! # Session windowing
//!
//! Per-key session windows with speculative and watermark-driven firing.
//!
//! - [`TimeWindow`]: half-open event-time span `[start, end)`
//! - [`SessionWindows`]: gap-based assignment and merging of sessions
//! - [`EarlyAndFinalTrigger`]: per-window `Open -> Closed` firing policy
//! - [`SessionAggregator`]: keyed engine folding records into a
//!   [`CombineFn`](crate::combine::CombineFn) accumulator per (key, window)

use std::collections::HashMap;
use std::marker::PhantomData;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::combine::CombineFn;
use crate::config::WindowConfig;
use crate::time::{EVENT_TIME_MAX, EVENT_TIME_MIN, TimeDomain, WindowTimer, WindowTimers};
use crate::types::{EventTime, StreamData, StreamElement, StreamRecord};

mod operator;
mod primitives;
mod session;
mod triggers;

pub use operator::*;
pub use primitives::*;
pub use session::*;
pub use triggers::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
