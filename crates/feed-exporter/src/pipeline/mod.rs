//! Event-to-metric pipeline.
//!
//! Leaf-first: [`validate`] checks a raw record, [`MetricRegistry`] creates
//! or reuses the metric object, [`resolve_labels`] computes its labels, and
//! [`apply`] mutates it. [`Pipeline`] sequences them per notification.

pub mod dispatcher;
pub mod labels;
pub mod orchestrator;
pub mod registry;
pub mod summary;
pub mod validator;

pub use dispatcher::apply;
pub use labels::{resolve_labels, JOB_LABEL, RECORD_LABEL};
pub use orchestrator::{EventOutcome, Pipeline, SkipReason};
pub use registry::{
    MetricHandle, MetricObject, MetricRegistry, RegistryOptions, DEFAULT_HISTOGRAM_BUCKETS,
};
pub use summary::SummaryVec;
pub use validator::validate;
