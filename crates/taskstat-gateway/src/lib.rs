//! taskstat gateway: exports a `TaskTracker` as a Prometheus gauge over HTTP.
//!
//! Wires the in-process metrics registry, the tracker-to-gauge exporter and
//! the embedded exposition endpoint. Consumed by host processes, the demo
//! binary (`main.rs`) and integration tests.

pub mod config;
pub mod endpoint;
pub mod exporter;
pub mod obs;
pub mod ops;
pub mod router;

pub use endpoint::{EndpointState, MetricsEndpoint};
pub use exporter::TaskStats;
pub use obs::MetricsRegistry;
