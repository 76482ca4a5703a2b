//! Operational HTTP handlers.
//!
//! - `<pattern>` : Prometheus text format

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::obs::{metrics::TEXT_FORMAT, MetricsRegistry};

pub async fn metrics(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    let body = registry.render();

    (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response()
}
