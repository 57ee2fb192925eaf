//! # RideCrab Core
//!
//! Session-windowed "latest wins" aggregation for keyed event streams.
//!
//! Records arrive keyed and timestamped from an ingestion collaborator; the
//! engine groups them into per-key session windows, folds each window into an
//! accumulator, and emits accumulated panes to a sink collaborator, once
//! speculatively and once when the watermark closes the window.
//!
//! - [`types`]: [`StreamElement`](types::StreamElement),
//!   [`StreamRecord`](types::StreamRecord), [`Watermark`](types::Watermark).
//! - [`combine`]: the [`CombineFn`](combine::CombineFn) interface and the
//!   [`LatestByTimestamp`](combine::LatestByTimestamp) monoid.
//! - [`window`]: session assignment, firing policy and the
//!   [`SessionAggregator`](window::SessionAggregator) engine.
//! - [`time`]: watermark generation and timers.
//! - [`config`]: [`WindowConfig`](config::WindowConfig).
//! - [`ride`]: the taxi ride position record and a ready-made engine.
//! - [`parallel`]: global-window combine across worker threads.

pub mod combine;
pub mod config;
pub mod parallel;
pub mod partitioner;
pub mod ride;
pub mod time;
pub mod types;
pub mod window;
