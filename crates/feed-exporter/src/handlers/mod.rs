//! HTTP request handlers for the Feed Exporter.

pub mod metrics;

pub use metrics::metrics_handler;
