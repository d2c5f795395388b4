//! Feed supervisor background task.
//!
//! Subscribes to the change feed and hands every insert/update notification
//! to the pipeline in its own task, with at most `max_in_flight` events
//! handled at once. When a subscription fails or ends, the supervisor
//! resubscribes with exponential backoff (1s, 2s, 4s, ..., max 30s), reset
//! after each successful subscription.
//!
//! # Readiness
//!
//! The service is ready while a subscription is open.
//!
//! # Graceful Shutdown
//!
//! When the cancellation token is triggered the supervisor stops reading
//! the feed, waits for in-flight events to finish, and returns.

use crate::feed::ChangeFeed;
use crate::models::Operation;
use crate::observability::metrics::{
    record_feed_error, record_feed_subscription, set_events_in_flight,
};
use crate::observability::HealthState;
use crate::pipeline::Pipeline;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

/// Initial delay before resubscribing.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum delay before resubscribing.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Feed supervisor settings.
#[derive(Debug, Clone)]
pub struct FeedSupervisorConfig {
    /// Maximum number of events handled concurrently.
    pub max_in_flight: usize,

    /// Delay before the first resubscription attempt.
    pub initial_backoff: Duration,

    /// Upper bound for the resubscription delay.
    pub max_backoff: Duration,
}

impl FeedSupervisorConfig {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Run the feed supervisor until the cancellation token is triggered.
///
/// # Arguments
///
/// * `feed` - Change feed to subscribe to
/// * `pipeline` - Pipeline handling each notification
/// * `health` - Readiness is set while subscribed
/// * `config` - Concurrency bound and backoff settings
/// * `cancel_token` - Token for graceful shutdown
#[instrument(skip_all, name = "feed_exporter.task.feed_supervisor")]
pub async fn run_feed_supervisor(
    feed: Arc<dyn ChangeFeed>,
    pipeline: Arc<Pipeline>,
    health: Arc<HealthState>,
    config: FeedSupervisorConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "feed_exporter.task.feed_supervisor",
        max_in_flight = config.max_in_flight,
        "Starting feed supervisor"
    );

    let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
    let tracker = TaskTracker::new();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let mut backoff = config.initial_backoff;

    'subscription: loop {
        let subscription = tokio::select! {
            result = feed.subscribe() => result,
            () = cancel_token.cancelled() => break 'subscription,
        };

        match subscription {
            Ok(mut stream) => {
                record_feed_subscription("success");
                health.set_ready();
                backoff = config.initial_backoff;
                info!(
                    target: "feed_exporter.task.feed_supervisor",
                    "Subscribed to change feed"
                );

                loop {
                    let next = tokio::select! {
                        next = stream.next() => next,
                        () = cancel_token.cancelled() => break 'subscription,
                    };

                    let notification = match next {
                        Some(Ok(notification)) => notification,
                        Some(Err(e)) => {
                            record_feed_error();
                            warn!(
                                target: "feed_exporter.task.feed_supervisor",
                                error = %e,
                                "Change feed failed, will resubscribe"
                            );
                            break;
                        }
                        None => {
                            record_feed_error();
                            warn!(
                                target: "feed_exporter.task.feed_supervisor",
                                "Change feed ended, will resubscribe"
                            );
                            break;
                        }
                    };

                    if notification.operation == Operation::Delete {
                        debug!(
                            target: "feed_exporter.task.feed_supervisor",
                            "Ignoring delete notification"
                        );
                        continue;
                    }

                    let permit = tokio::select! {
                        permit = Arc::clone(&semaphore).acquire_owned() => permit,
                        () = cancel_token.cancelled() => break 'subscription,
                    };
                    // The semaphore is never closed
                    let Ok(permit) = permit else {
                        break 'subscription;
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let in_flight = Arc::clone(&in_flight);
                    set_events_in_flight(in_flight.fetch_add(1, Ordering::SeqCst) + 1);

                    tracker.spawn(async move {
                        // Failures are logged and counted by the pipeline
                        let _ = pipeline.handle(&notification).await;
                        set_events_in_flight(
                            in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1),
                        );
                        drop(permit);
                    });
                }

                health.set_not_ready();
            }
            Err(e) => {
                record_feed_subscription("error");
                warn!(
                    target: "feed_exporter.task.feed_supervisor",
                    error = %e,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "Failed to subscribe to change feed, will retry"
                );
            }
        }

        tokio::select! {
            () = tokio::time::sleep(backoff) => {}
            () = cancel_token.cancelled() => break 'subscription,
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }

    health.set_not_ready();
    info!(
        target: "feed_exporter.task.feed_supervisor",
        in_flight = in_flight.load(Ordering::SeqCst),
        "Feed supervisor received shutdown signal, draining in-flight events"
    );

    tracker.close();
    tracker.wait().await;

    info!(
        target: "feed_exporter.task.feed_supervisor",
        "Feed supervisor stopped"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::FeedError;
    use crate::feed::mock::ScriptedChangeFeed;
    use crate::pipeline::{MetricRegistry, RegistryOptions};
    use crate::store::mock::InMemoryDocumentStore;
    use crate::transform::FieldMapping;

    #[test]
    fn test_default_backoff() {
        let config = FeedSupervisorConfig::new(16);
        assert_eq!(config.max_in_flight, 16);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_in_flight_is_raised_to_one() {
        assert_eq!(FeedSupervisorConfig::new(0).max_in_flight, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_supervisor() {
        let feed = Arc::new(
            ScriptedChangeFeed::new().then_fail(FeedError::Connect("refused".to_string())),
        );
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(FieldMapping::new("m", "value")),
            Arc::new(MetricRegistry::new(RegistryOptions::default())),
            "requests",
            "test_job",
        ));
        let health = Arc::new(HealthState::new());
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(run_feed_supervisor(
            feed.clone(),
            pipeline,
            Arc::clone(&health),
            FeedSupervisorConfig::new(4),
            cancel_token.clone(),
        ));

        // Second attempt succeeds after the 1s backoff
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(feed.subscribe_count(), 2);
        assert!(health.is_ready());

        cancel_token.cancel();
        handle.await.unwrap();
        assert!(!health.is_ready());
    }
}
