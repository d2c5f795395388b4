//! Feed Exporter error types.
//!
//! Every error below is scoped to the single event that triggered it. The
//! pipeline logs and counts it, then moves on to the next notification.
//! `PipelineError::error_type` provides the bounded label used in metrics.

use crate::models::MetricKind;
use thiserror::Error;

/// Record field named in a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Metric,
    Value,
    Help,
    Type,
}

impl RecordField {
    /// Returns the record key for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Metric => "metric",
            RecordField::Value => "value",
            RecordField::Help => "help",
            RecordField::Type => "type",
        }
    }
}

fn wrong_type_message(field: &RecordField) -> &'static str {
    match field {
        RecordField::Metric => "A metric should be string.",
        RecordField::Value => "A value of metric should be number.",
        RecordField::Help => "A help of metric should be string.",
        RecordField::Type => "A type of metric should be string.",
    }
}

/// Metric record failed shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `metric` and/or `value` absent.
    #[error("no metric and/or value")]
    MissingField,

    /// A field is present with the wrong JSON type.
    #[error("{}", wrong_type_message(.0))]
    WrongType(RecordField),
}

/// Record declared a metric type outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "The record type {kind} is not supported. Please use one of the following: {}.",
    MetricKind::supported()
)]
pub struct UnsupportedTypeError {
    /// The declared type as it appeared in the record.
    pub kind: String,
}

/// Metric object creation failed.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),

    /// The exposition registry refused the new metric (invalid name or label,
    /// or a collision with a collector registered outside this registry).
    #[error("Failed to register metric {metric}: {source}")]
    Registration {
        metric: String,
        #[source]
        source: prometheus::Error,
    },

    /// The name belongs to the exporter's own operational metrics.
    #[error("Metric name {metric} is reserved for the exporter's own metrics")]
    ReservedName { metric: String },

    /// Baseline process metrics are not available on this platform.
    #[error("Process metrics are not supported on this platform")]
    ProcessMetricsUnsupported,
}

/// Applying a record to its metric object failed.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),

    /// Record type differs from the type the metric was created with.
    #[error("Metric {metric} is a {registered}, record declares {requested}")]
    TypeMismatch {
        metric: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    /// Record carries a label outside the metric's label-name set.
    #[error("Label {label} is not part of the label set of metric {metric}")]
    UnknownLabel { metric: String, label: String },

    /// Counters only go up.
    #[error("Counter {metric} cannot be incremented by negative value {value}")]
    NegativeCounter { metric: String, value: f64 },

    /// The underlying metric vector rejected the label values.
    #[error("Failed to update metric {metric}: {source}")]
    Exposition {
        metric: String,
        #[source]
        source: prometheus::Error,
    },
}

/// Document store failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Document {0} is not a JSON object")]
    NotAnObject(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Caller-supplied transform reported a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transform failed: {0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Change feed failure. Terminal for the current subscription only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("Feed connection failed: {0}")]
    Connect(String),

    #[error("Feed stream failed: {0}")]
    Stream(String),
}

/// Per-event pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Notification carries no document identifier")]
    MissingIdentifier,

    #[error("Fetch failed: {0}")]
    Fetch(#[from] StoreError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Invalid metric record: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl PipelineError {
    /// Bounded error category for metrics labels.
    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::MissingIdentifier => "missing_identifier",
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Transform(_) => "transform",
            PipelineError::Validation(_) => "validation",
            PipelineError::Registry(RegistryError::UnsupportedType(_))
            | PipelineError::Apply(ApplyError::UnsupportedType(_)) => "unsupported_type",
            PipelineError::Registry(RegistryError::ReservedName { .. }) => "reserved_name",
            PipelineError::Registry(_) => "registration",
            PipelineError::Apply(ApplyError::TypeMismatch { .. }) => "type_mismatch",
            PipelineError::Apply(ApplyError::UnknownLabel { .. }) => "unknown_label",
            PipelineError::Apply(ApplyError::NegativeCounter { .. }) => "negative_counter",
            PipelineError::Apply(ApplyError::Exposition { .. }) => "exposition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::MissingField.to_string(),
            "no metric and/or value"
        );
        assert_eq!(
            ValidationError::WrongType(RecordField::Metric).to_string(),
            "A metric should be string."
        );
        assert_eq!(
            ValidationError::WrongType(RecordField::Value).to_string(),
            "A value of metric should be number."
        );
        assert_eq!(
            ValidationError::WrongType(RecordField::Help).to_string(),
            "A help of metric should be string."
        );
        assert_eq!(
            ValidationError::WrongType(RecordField::Type).to_string(),
            "A type of metric should be string."
        );
    }

    #[test]
    fn test_unsupported_type_names_all_supported_types() {
        let error = UnsupportedTypeError {
            kind: "unknown".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "The record type unknown is not supported. Please use one of the following: counter, gauge, histogram, summary."
        );
    }

    #[test]
    fn test_display_pipeline_errors() {
        assert_eq!(
            PipelineError::MissingIdentifier.to_string(),
            "Notification carries no document identifier"
        );
        assert_eq!(
            PipelineError::from(StoreError::Database("timeout".to_string())).to_string(),
            "Fetch failed: Database error: timeout"
        );
        assert_eq!(
            PipelineError::from(TransformError::new("boom")).to_string(),
            "Transform failed: boom"
        );
        assert_eq!(
            PipelineError::from(ValidationError::MissingField).to_string(),
            "Invalid metric record: no metric and/or value"
        );
    }

    #[test]
    fn test_error_types_are_bounded() {
        let unsupported = UnsupportedTypeError {
            kind: "x".to_string(),
        };
        let cases = [
            (PipelineError::MissingIdentifier, "missing_identifier"),
            (
                PipelineError::Fetch(StoreError::Database("x".to_string())),
                "fetch",
            ),
            (
                PipelineError::Transform(TransformError::new("x")),
                "transform",
            ),
            (
                PipelineError::Validation(ValidationError::MissingField),
                "validation",
            ),
            (
                PipelineError::Registry(RegistryError::UnsupportedType(unsupported.clone())),
                "unsupported_type",
            ),
            (
                PipelineError::Registry(RegistryError::ReservedName {
                    metric: "feed_exporter_events_total".to_string(),
                }),
                "reserved_name",
            ),
            (
                PipelineError::Apply(ApplyError::UnsupportedType(unsupported)),
                "unsupported_type",
            ),
            (
                PipelineError::Apply(ApplyError::TypeMismatch {
                    metric: "m".to_string(),
                    registered: MetricKind::Gauge,
                    requested: MetricKind::Counter,
                }),
                "type_mismatch",
            ),
            (
                PipelineError::Apply(ApplyError::UnknownLabel {
                    metric: "m".to_string(),
                    label: "l".to_string(),
                }),
                "unknown_label",
            ),
            (
                PipelineError::Apply(ApplyError::NegativeCounter {
                    metric: "m".to_string(),
                    value: -1.0,
                }),
                "negative_counter",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.error_type(), expected, "for {error}");
        }
    }
}
