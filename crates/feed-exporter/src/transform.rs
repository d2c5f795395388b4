//! Document-to-record transforms.
//!
//! A transform turns a fetched document into a raw metric record, or
//! declines with `Ok(None)`. Any closure with the right signature is a
//! transform; [`FieldMapping`] is the configurable one the binary uses.

use crate::config::{field_label_name, TransformConfig};
use crate::errors::TransformError;
use crate::models::{Document, MetricKind};
use serde_json::{Map, Value};
use tracing::debug;

/// Caller-supplied document transform.
///
/// `Ok(None)`, `Ok(Some(Value::Null))` and `Ok(Some({}))` all mean "skip
/// this document".
#[async_trait::async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self, document: &Document) -> Result<Option<Value>, TransformError>;
}

#[async_trait::async_trait]
impl<F> Transform for F
where
    F: Fn(&Document) -> Result<Option<Value>, TransformError> + Send + Sync,
{
    async fn transform(&self, document: &Document) -> Result<Option<Value>, TransformError> {
        self(document)
    }
}

/// Maps one numeric document field to a metric record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    metric: String,
    value_field: String,
    kind: Option<MetricKind>,
    label: Option<String>,
    label_fields: Vec<String>,
    help: Option<String>,
}

impl FieldMapping {
    pub fn new(metric: impl Into<String>, value_field: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value_field: value_field.into(),
            kind: None,
            label: None,
            label_fields: Vec::new(),
            help: None,
        }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self {
            metric: config.metric.clone(),
            value_field: config.value_field.clone(),
            kind: config.kind,
            label: config.label.clone(),
            label_fields: config.label_fields.clone(),
            help: config.help.clone(),
        }
    }

    pub fn with_kind(mut self, kind: MetricKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_label_fields(mut self, fields: Vec<String>) -> Self {
        self.label_fields = fields;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Build the record for `document`. `None` when the value field is
    /// missing or not a number.
    fn map(&self, document: &Document) -> Option<Value> {
        let value = lookup(document, &self.value_field).filter(|v| v.is_number());
        let Some(value) = value else {
            debug!(
                target: "feed_exporter.transform",
                metric = %self.metric,
                field = %self.value_field,
                "Value field missing or not numeric, skipping document"
            );
            return None;
        };

        let mut record = Map::new();
        record.insert("metric".to_string(), Value::String(self.metric.clone()));
        record.insert("value".to_string(), value.clone());
        if let Some(kind) = self.kind {
            record.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        }
        if let Some(help) = &self.help {
            record.insert("help".to_string(), Value::String(help.clone()));
        }
        if let Some(label) = &self.label {
            record.insert("label".to_string(), Value::String(label.clone()));
        }
        for field in &self.label_fields {
            if let Some(label_value) = lookup(document, field) {
                record.insert(field_label_name(field), label_value.clone());
            }
        }

        Some(Value::Object(record))
    }
}

#[async_trait::async_trait]
impl Transform for FieldMapping {
    async fn transform(&self, document: &Document) -> Result<Option<Value>, TransformError> {
        Ok(self.map(document))
    }
}

/// Resolve a dotted path (`"stats.total"`) inside a document.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = document.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| value.as_object()?.get(segment))
}
