//! Top-level facade crate for taskstat.
//!
//! Re-exports the tracker core and the exporter so users can depend on a single crate.

pub mod core {
    pub use taskstat_core::*;
}

pub mod gateway {
    pub use taskstat_gateway::*;
}

pub use taskstat_core::{Result, TaskGuard, TaskStatError, TaskTracker};
pub use taskstat_gateway::{MetricsEndpoint, MetricsRegistry, TaskStats};
