//! Feed Exporter
//!
//! Exposes metrics derived from a document change feed for Prometheus.
//!
//! # Startup Flow
//!
//! 1. Initialize tracing
//! 2. Load configuration from environment
//! 3. Initialize the operational metrics recorder
//! 4. Create the metric registry (with process metrics when enabled)
//! 5. Connect to the document store
//! 6. Spawn the feed supervisor
//! 7. Serve the scrape and health endpoints until a shutdown signal
//! 8. Cancel the supervisor and wait for in-flight events

use feed_exporter::config::Config;
use feed_exporter::feed::PgChangeFeed;
use feed_exporter::observability::metrics::init_metrics_recorder;
use feed_exporter::observability::HealthState;
use feed_exporter::pipeline::{MetricRegistry, Pipeline, RegistryOptions};
use feed_exporter::routes::{build_routes, AppState};
use feed_exporter::store::PgDocumentStore;
use feed_exporter::tasks::{run_feed_supervisor, FeedSupervisorConfig};
use feed_exporter::transform::FieldMapping;
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Statement timeout applied to document fetches.
const QUERY_TIMEOUT_SECONDS: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Feed Exporter");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        database = %config.database,
        collection = %config.collection,
        channel = %config.channel,
        job = %config.job,
        bind_address = %config.bind_address,
        metrics_path = %config.metrics_path,
        default_metrics = config.default_metrics,
        max_in_flight_events = config.max_in_flight_events,
        "Configuration loaded successfully"
    );

    // Must happen before any operational metric is recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let registry = Arc::new(MetricRegistry::new(RegistryOptions {
        additional_label_names: config.registry_label_names(),
        histogram_buckets: config.histogram_buckets.clone(),
    }));
    if config.default_metrics {
        match registry.register_process_collector() {
            Ok(()) => info!("Process metrics enabled"),
            Err(e) => warn!(error = %e, "Process metrics unavailable"),
        }
    }

    info!("Connecting to database...");
    let db_url_with_timeout =
        add_query_timeout(config.database_url.expose_secret(), QUERY_TIMEOUT_SECONDS);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;
    info!("Database connection established");

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(PgDocumentStore::new(db_pool, config.database.clone())),
        Arc::new(FieldMapping::from_config(&config.transform)),
        Arc::clone(&registry),
        config.collection.clone(),
        config.job.clone(),
    ));
    let feed = Arc::new(PgChangeFeed::new(
        config.feed_database_url.clone(),
        config.channel.clone(),
    ));
    let health = Arc::new(HealthState::new());

    let shutdown_token = CancellationToken::new();
    let supervisor = tokio::spawn(run_feed_supervisor(
        feed,
        pipeline,
        Arc::clone(&health),
        FeedSupervisorConfig::new(config.max_in_flight_events),
        shutdown_token.child_token(),
    ));

    let app = build_routes(
        AppState {
            registry,
            metrics_handle,
            health,
        },
        &config.metrics_path,
    );

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind metrics server");
        e
    })?;
    info!("Feed Exporter listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_token.cancel();
    if let Err(e) = supervisor.await {
        error!(error = %e, "Feed supervisor task failed");
    }

    info!("Feed Exporter shutdown complete");

    Ok(())
}

/// Initialize tracing. `LOG_FORMAT=json` selects structured JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "feed_exporter=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}options=-c%20statement_timeout%3D{timeout_secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_query_timeout() {
        assert_eq!(
            add_query_timeout("postgresql://localhost/feeds", 5),
            "postgresql://localhost/feeds?options=-c%20statement_timeout%3D5s"
        );
        assert_eq!(
            add_query_timeout("postgresql://localhost/feeds?sslmode=disable", 5),
            "postgresql://localhost/feeds?sslmode=disable&options=-c%20statement_timeout%3D5s"
        );
    }
}
