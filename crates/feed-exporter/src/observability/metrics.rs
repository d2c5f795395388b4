//! Operational metrics for the Feed Exporter itself.
//!
//! These describe the exporter's own behavior (events processed, errors,
//! feed subscriptions) and are recorded through the `metrics` facade. The
//! user-defined metrics produced from documents live in
//! [`crate::pipeline::MetricRegistry`] instead.
//!
//! All metrics follow Prometheus naming conventions:
//! - `feed_exporter_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: applied, skipped, error
//! - `error_type`: bounded by `PipelineError` variants
//! - `kind`: the four supported metric kinds
//! - `status`: success, error (feed); found, not_found, error (store)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Name prefix of every operational metric. User-defined metrics may not
/// use it, since both sets are rendered into one scrape body.
pub const OPERATIONAL_METRIC_PREFIX: &str = "feed_exporter_";

/// Initialize the Prometheus recorder for operational metrics and return
/// the handle used to render them on the scrape endpoint.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling is a fetch plus a few in-memory updates
        .set_buckets_for_metric(
            Matcher::Prefix("feed_exporter_event".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set event buckets: {e}"))?
        // Single-row lookups by primary key
        .set_buckets_for_metric(
            Matcher::Prefix("feed_exporter_store".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set store fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Event Metrics
// ============================================================================

/// Record one processed change event.
///
/// Metric: `feed_exporter_events_total`, `feed_exporter_event_duration_seconds`
/// Labels: `outcome`
pub fn record_event(outcome: &str, duration: Duration) {
    counter!("feed_exporter_events_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("feed_exporter_event_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Record a failed change event by error category.
///
/// Metric: `feed_exporter_event_errors_total`
/// Labels: `error_type`
pub fn record_event_error(error_type: &str) {
    counter!("feed_exporter_event_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

/// Set the number of events currently being handled.
///
/// Metric: `feed_exporter_events_in_flight`
pub fn set_events_in_flight(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    let count = count as f64;
    gauge!("feed_exporter_events_in_flight").set(count);
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a document fetch.
///
/// Metric: `feed_exporter_store_fetches_total`, `feed_exporter_store_fetch_duration_seconds`
/// Labels: `status` (found, not_found, error)
pub fn record_store_fetch(status: &str, duration: Duration) {
    counter!("feed_exporter_store_fetches_total", "status" => status.to_string()).increment(1);
    histogram!("feed_exporter_store_fetch_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Record creation of a user-defined metric object.
///
/// Metric: `feed_exporter_metrics_created_total`
/// Labels: `kind`
pub fn record_metric_created(kind: &str) {
    counter!("feed_exporter_metrics_created_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// Feed Metrics
// ============================================================================

/// Record a change-feed subscription attempt.
///
/// Metric: `feed_exporter_feed_subscriptions_total`
/// Labels: `status`
pub fn record_feed_subscription(status: &str) {
    counter!("feed_exporter_feed_subscriptions_total", "status" => status.to_string())
        .increment(1);
}

/// Record a change-feed stream failure.
///
/// Metric: `feed_exporter_feed_errors_total`
pub fn record_feed_error() {
    counter!("feed_exporter_feed_errors_total").increment(1);
}
