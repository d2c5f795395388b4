//! Prometheus scrape handler.
//!
//! Serves the user-defined metrics (and process metrics, when enabled)
//! from the [`MetricRegistry`], followed by the exporter's own operational
//! metrics, in the Prometheus text format.

use crate::routes::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

/// Handler for GET on the configured scrape path.
///
/// # Response
///
/// Returns 200 OK with Prometheus text format:
/// ```text
/// # HELP test_metric test_metric with type counter
/// # TYPE test_metric counter
/// test_metric{job="orders-exporter",label="test"} 42
/// ```
#[tracing::instrument(skip_all, name = "feed_exporter.metrics.scrape")]
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!(
            target: "feed_exporter.metrics",
            error = %e,
            "Failed to encode metrics"
        );
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut body = String::from_utf8_lossy(&buffer).into_owned();
    body.push_str(&state.metrics_handle.render());

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    )
        .into_response()
}
