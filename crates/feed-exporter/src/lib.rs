//! Feed Exporter Library
//!
//! Turns a live change feed from a document store into Prometheus metrics.
//! For every insert or update notification the exporter fetches the
//! affected document, runs a transform that produces a metric record, and
//! applies the record to a registry of counters, gauges, histograms and
//! summaries that is served for scraping.
//!
//! # Architecture
//!
//! ```text
//! ChangeFeed ──> FeedSupervisor ──> Pipeline (one task per event)
//!                                     │
//!                                     ├── DocumentStore::fetch_by_id
//!                                     ├── Transform::transform
//!                                     ├── validate
//!                                     ├── MetricRegistry::resolve (create-or-get)
//!                                     ├── resolve_labels
//!                                     └── apply
//!
//! GET /metrics ──> MetricRegistry::gather + operational metrics
//! ```
//!
//! # Failure isolation
//!
//! Every error is scoped to the event that caused it: it is logged,
//! counted, and the next notification is handled normally. A failing feed
//! is resubscribed with backoff and never stops the process.
//!
//! # Modules
//!
//! - [`pipeline`] - Validation, registry, labels, dispatch, orchestration
//! - [`feed`] - Change feed seam and the Postgres LISTEN/NOTIFY feed
//! - [`store`] - Document store seam and the Postgres store
//! - [`transform`] - Transform seam and the field-mapping transform
//! - [`tasks`] - Feed supervisor background task
//! - [`config`] - Service configuration from environment

pub mod config;
pub mod errors;
pub mod feed;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod routes;
pub mod store;
pub mod tasks;
pub mod transform;
