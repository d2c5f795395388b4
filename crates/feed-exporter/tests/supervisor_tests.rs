//! Integration tests for the feed supervisor.
//!
//! Runs the supervisor against scripted feeds with paused time so backoff
//! delays elapse instantly.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use feed_exporter::errors::FeedError;
use feed_exporter::observability::HealthState;
use feed_test_utils::*;
use serde_json::json;

fn harness_with_documents() -> PipelineHarness {
    let harness = PipelineHarness::new(counter_transform);
    harness.store.insert(COLLECTION, "1", json!({"total": 1}));
    harness.store.insert(COLLECTION, "2", json!({"total": 10}));
    harness.store.insert(COLLECTION, "3", json!({"total": 100}));
    harness
}

#[tokio::test(start_paused = true)]
async fn test_events_are_applied_and_deletes_ignored() {
    let harness = harness_with_documents();
    let feed = Arc::new(ScriptedChangeFeed::new().then_hold(feed_items(vec![
        insert("1"),
        delete("1"),
        update("2"),
    ])));
    let health = Arc::new(HealthState::new());

    let (cancel_token, handle) = harness.spawn_supervisor(feed.clone(), Arc::clone(&health), 4);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(health.is_ready());
    assert_eq!(harness.counter("test_metric", &["test", JOB]), Some(11.0));
    assert_eq!(harness.store.fetch_count(), 2);

    cancel_token.cancel();
    handle.await.unwrap();
    assert_eq!(feed.subscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribes_after_stream_error() {
    let harness = harness_with_documents();
    let feed = Arc::new(
        ScriptedChangeFeed::new()
            .then_stream(vec![
                Ok(insert("1")),
                Err(FeedError::Stream("connection reset".to_string())),
            ])
            .then_hold(feed_items(vec![insert("3")])),
    );
    let health = Arc::new(HealthState::new());

    let (cancel_token, handle) = harness.spawn_supervisor(feed.clone(), Arc::clone(&health), 4);

    // Resubscription happens after the 1s backoff
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(feed.subscribe_count(), 1);
    assert!(!health.is_ready());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(feed.subscribe_count(), 2);
    assert!(health.is_ready());
    assert_eq!(harness.counter("test_metric", &["test", JOB]), Some(101.0));

    cancel_token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resubscribes_after_stream_end() {
    let harness = harness_with_documents();
    let feed = Arc::new(
        ScriptedChangeFeed::new()
            .then_stream(feed_items(vec![insert("2")]))
            .then_hold(feed_items(vec![insert("2")])),
    );
    let health = Arc::new(HealthState::new());

    let (cancel_token, handle) = harness.spawn_supervisor(feed.clone(), Arc::clone(&health), 4);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(feed.subscribe_count(), 2);
    assert_eq!(harness.counter("test_metric", &["test", JOB]), Some(20.0));

    cancel_token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_between_failed_subscriptions() {
    let harness = harness_with_documents();
    let feed = Arc::new(
        ScriptedChangeFeed::new()
            .then_fail(FeedError::Connect("refused".to_string()))
            .then_fail(FeedError::Connect("refused".to_string()))
            .then_fail(FeedError::Connect("refused".to_string())),
    );
    let health = Arc::new(HealthState::new());

    let (cancel_token, handle) = harness.spawn_supervisor(feed.clone(), Arc::clone(&health), 4);

    // Attempts at t=0, t=1s, t=3s, t=7s
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(feed.subscribe_count(), 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(feed.subscribe_count(), 3);
    assert!(!health.is_ready());
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(feed.subscribe_count(), 4);
    assert!(health.is_ready());

    cancel_token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_event_does_not_stop_the_feed() {
    let harness = PipelineHarness::new(counter_transform);
    harness.store.insert(COLLECTION, "good", json!({"total": 5}));
    harness
        .store
        .insert(COLLECTION, "bad", json!({"total": "five"}));
    let feed = Arc::new(ScriptedChangeFeed::new().then_hold(feed_items(vec![
        insert("bad"),
        insert("missing"),
        insert("good"),
    ])));
    let health = Arc::new(HealthState::new());

    let (cancel_token, handle) = harness.spawn_supervisor(feed.clone(), Arc::clone(&health), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.counter("test_metric", &["test", JOB]), Some(5.0));
    assert_eq!(feed.subscribe_count(), 1);
    assert!(health.is_ready());

    cancel_token.cancel();
    handle.await.unwrap();
}
