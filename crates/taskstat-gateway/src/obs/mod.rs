//! Lightweight in-process metrics (no client library).
//!
//! Gauges are stored as atomics, grouped in an explicit `MetricsRegistry`
//! and rendered by the metrics HTTP handler.

pub mod metrics;

pub use metrics::{Collector, GaugeVec, MetricsRegistry};
