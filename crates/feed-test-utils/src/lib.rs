//! # Feed Test Utilities
//!
//! Shared test utilities for the Feed Exporter.
//!
//! This crate provides:
//! - Notification and transform fixtures
//! - Pipeline harness (`PipelineHarness` wiring an in-memory store to a
//!   fresh registry)
//! - Re-exports of the in-memory store and scripted feed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use feed_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = PipelineHarness::new(counter_transform);
//!     harness.store.insert(COLLECTION, "5", serde_json::json!({"total": 42}));
//!
//!     harness.pipeline.handle(&insert("5")).await.unwrap();
//!     assert_eq!(harness.counter("test_metric", &["test", JOB]), Some(42.0));
//! }
//! ```

pub mod fixtures;
pub mod harness;

// Re-export commonly used items
pub use feed_exporter::feed::mock::ScriptedChangeFeed;
pub use feed_exporter::store::mock::InMemoryDocumentStore;
pub use fixtures::*;
pub use harness::*;
