//! HTTP routes for the Feed Exporter.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::observability::{health_router, HealthState};
use crate::pipeline::MetricRegistry;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry of user-defined metrics.
    pub registry: Arc<MetricRegistry>,

    /// Handle rendering the exporter's operational metrics.
    pub metrics_handle: PrometheusHandle,

    /// Liveness and readiness flags.
    pub health: Arc<HealthState>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `metrics_path` - Prometheus scrape endpoint
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe (change feed subscribed)
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: AppState, metrics_path: &str) -> Router {
    let metrics_routes = Router::new()
        .route(metrics_path, get(handlers::metrics_handler))
        .with_state(state.clone());

    health_router(state.health)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, RegistryOptions};
    use crate::store::mock::InMemoryDocumentStore;
    use crate::transform::FieldMapping;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;
    use tower::util::ServiceExt;

    fn state() -> AppState {
        AppState {
            registry: Arc::new(MetricRegistry::new(RegistryOptions::default())),
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
            health: Arc::new(HealthState::new()),
        }
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app
            .oneshot(request)
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_scrape_renders_created_metrics() {
        let state = state();
        let pipeline = Pipeline::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(FieldMapping::new("unused", "value")),
            Arc::clone(&state.registry),
            "requests",
            "orders-exporter",
        );
        pipeline
            .apply_record(&json!({"metric": "test_metric", "value": 42, "type": "counter", "label": "test"}))
            .unwrap();

        let (status, body) = get_body(build_routes(state, "/metrics"), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# HELP test_metric test_metric with type counter"));
        assert!(body.contains("# TYPE test_metric counter"));
        assert!(body.contains(r#"test_metric{job="orders-exporter",label="test"} 42"#));
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let (status, _) = get_body(build_routes(state(), "/prometheus"), "/prometheus").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get_body(build_routes(state(), "/prometheus"), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_routes_are_mounted() {
        let state = state();
        state.health.set_ready();

        let (status, _) = get_body(build_routes(state.clone(), "/metrics"), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get_body(build_routes(state, "/metrics"), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }
}
