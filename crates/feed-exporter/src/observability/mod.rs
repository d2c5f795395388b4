//! Observability for the Feed Exporter: operational metrics and health probes.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
