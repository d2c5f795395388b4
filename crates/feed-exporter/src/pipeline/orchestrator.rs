//! Pipeline orchestrator.
//!
//! Handles one change notification end to end:
//!
//! 1. Extract the document id (after-image first, then before-image)
//! 2. Fetch the document; a missing document is a skip
//! 3. Run the transform; no record is a skip
//! 4. Validate, resolve the metric object, resolve labels, apply
//!
//! Each call is independent. A failure aborts only the event at hand and
//! leaves previously applied state untouched.

use crate::errors::PipelineError;
use crate::models::{ChangeNotification, MetricKind};
use crate::observability::metrics;
use crate::pipeline::{apply, resolve_labels, validate, MetricRegistry};
use crate::store::DocumentStore;
use crate::transform::Transform;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Why an event produced no metric update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The document no longer exists in the store.
    NotFound,
    /// The transform declined to produce a record.
    TransformSkipped,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotFound => "not_found",
            SkipReason::TransformSkipped => "transform_skipped",
        }
    }
}

/// Result of a successfully handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The record was applied to the named metric.
    Applied { metric: String, kind: MetricKind },
    /// Nothing was applied.
    Skipped(SkipReason),
}

/// Event-to-metric pipeline for one collection.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    transform: Arc<dyn Transform>,
    registry: Arc<MetricRegistry>,
    collection: String,
    job: String,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        transform: Arc<dyn Transform>,
        registry: Arc<MetricRegistry>,
        collection: impl Into<String>,
        job: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transform,
            registry,
            collection: collection.into(),
            job: job.into(),
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Handle one notification. Records the outcome in operational metrics
    /// and logs failures.
    #[instrument(
        skip_all,
        name = "feed_exporter.pipeline.handle",
        fields(
            operation = notification.operation.as_str(),
            document_id = tracing::field::Empty
        )
    )]
    pub async fn handle(
        &self,
        notification: &ChangeNotification,
    ) -> Result<EventOutcome, PipelineError> {
        let start = Instant::now();
        let result = self.process(notification).await;
        let duration = start.elapsed();

        match &result {
            Ok(EventOutcome::Applied { metric, kind }) => {
                metrics::record_event("applied", duration);
                debug!(
                    target: "feed_exporter.pipeline",
                    metric = %metric,
                    kind = %kind,
                    "Applied metric record"
                );
            }
            Ok(EventOutcome::Skipped(reason)) => {
                metrics::record_event("skipped", duration);
                debug!(
                    target: "feed_exporter.pipeline",
                    reason = reason.as_str(),
                    "Skipped event"
                );
            }
            Err(e) => {
                metrics::record_event("error", duration);
                metrics::record_event_error(e.error_type());
                warn!(
                    target: "feed_exporter.pipeline",
                    error = %e,
                    error_type = e.error_type(),
                    "Failed to handle change notification"
                );
            }
        }

        result
    }

    async fn process(
        &self,
        notification: &ChangeNotification,
    ) -> Result<EventOutcome, PipelineError> {
        let id = notification
            .document_id()
            .ok_or(PipelineError::MissingIdentifier)?;
        tracing::Span::current().record("document_id", id.as_str());

        let Some(document) = self.store.fetch_by_id(&self.collection, id).await? else {
            return Ok(EventOutcome::Skipped(SkipReason::NotFound));
        };

        match self.transform.transform(&document).await? {
            Some(raw) if !is_skip(&raw) => self.apply_record(&raw),
            _ => Ok(EventOutcome::Skipped(SkipReason::TransformSkipped)),
        }
    }

    /// Validate a raw record and apply it to the registry.
    pub fn apply_record(&self, raw: &Value) -> Result<EventOutcome, PipelineError> {
        let record = validate(raw)?;
        let object = self.registry.resolve(&record)?;
        let labels = resolve_labels(&record, &self.job);
        apply(&object, record.kind.as_deref(), &labels, record.value)?;

        Ok(EventOutcome::Applied {
            metric: record.metric,
            kind: object.kind(),
        })
    }
}

/// `null` and `{}` are explicit "no record".
fn is_skip(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
