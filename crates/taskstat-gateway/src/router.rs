//! Axum router wiring for the exposition endpoint.
//!
//! Exposes exactly one route: `GET <pattern>` rendering the registry.

use std::sync::Arc;

use axum::{routing::get, Router};
use taskstat_core::error::{Result, TaskStatError};

use crate::{obs::MetricsRegistry, ops};

pub fn build_router(pattern: &str, registry: Arc<MetricsRegistry>) -> Result<Router> {
    validate_pattern(pattern)?;
    Ok(Router::new()
        .route(pattern, get(ops::metrics))
        .with_state(registry))
}

/// Literal absolute paths only; axum would treat `:`/`*` segments as captures.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if !pattern.starts_with('/') {
        return Err(TaskStatError::BadRequest(format!(
            "metrics path must start with '/': {pattern:?}"
        )));
    }
    if pattern.contains([':', '*', '{', '}']) || pattern.contains("//") {
        return Err(TaskStatError::BadRequest(format!(
            "metrics path must be a literal path: {pattern:?}"
        )));
    }
    Ok(())
}
