//! Background tasks for the Feed Exporter.

pub mod feed_supervisor;

pub use feed_supervisor::{run_feed_supervisor, FeedSupervisorConfig};
