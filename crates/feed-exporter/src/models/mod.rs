//! Feed Exporter models.
//!
//! Contains the data types that flow through the event-to-metric pipeline:
//! change notifications, fetched documents, and typed metric records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A document fetched from the store. Always a JSON object.
pub type Document = Map<String, Value>;

/// Final label mapping applied to a metric object.
///
/// Ordered so that debug output and test assertions are deterministic.
pub type ResolvedLabels = BTreeMap<String, String>;

/// Top-level record keys that never become labels.
pub const RESERVED_RECORD_KEYS: [&str; 5] = ["metric", "label", "value", "help", "type"];

// ============================================================================
// Change Notifications
// ============================================================================

/// Identifier of a document in the store.
///
/// Stored as text regardless of the store's native key type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract an identifier from a JSON value.
    ///
    /// Accepts strings, numbers, and extended-JSON object ids (`{"$oid": "..."}`).
    /// Empty strings, nulls, and any other shape yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            Value::Object(map) => map
                .get("$oid")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| Self(s.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        DocumentId::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("document id must be a string or number"))
    }
}

/// Kind of change reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A document was inserted.
    Insert,

    /// A document was updated.
    Update,

    /// A document was deleted. Never turned into a metric.
    Delete,
}

impl Operation {
    /// Returns the string representation of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Before- or after-image reference carried by a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentRef {
    /// Identifier of the referenced document, if the image carries one.
    #[serde(default, alias = "_id", deserialize_with = "lenient_id")]
    pub id: Option<DocumentId>,
}

impl DocumentRef {
    /// Reference to a document with the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(DocumentId::new(id)),
        }
    }
}

/// Unparseable ids are treated as absent rather than failing the whole notification.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<DocumentId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(DocumentId::from_json(&value))
}

/// One change-feed event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeNotification {
    /// Kind of change.
    pub operation: Operation,

    /// Image of the document before the change.
    #[serde(default)]
    pub before: Option<DocumentRef>,

    /// Image of the document after the change.
    #[serde(default)]
    pub after: Option<DocumentRef>,
}

impl ChangeNotification {
    /// Insert notification whose after-image carries `id`.
    pub fn insert(id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Insert,
            before: None,
            after: Some(DocumentRef::with_id(id)),
        }
    }

    /// Update notification whose after-image carries `id`.
    pub fn update(id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Update,
            before: None,
            after: Some(DocumentRef::with_id(id)),
        }
    }

    /// Parse a notification from its JSON wire form.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Identifier of the affected document.
    ///
    /// Prefers the after-image's id and falls back to the before-image's id.
    pub fn document_id(&self) -> Option<&DocumentId> {
        self.after
            .as_ref()
            .and_then(|image| image.id.as_ref())
            .or_else(|| self.before.as_ref().and_then(|image| image.id.as_ref()))
    }
}

// ============================================================================
// Metric Records
// ============================================================================

/// Supported metric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonic counter, incremented by each value.
    Counter,

    /// Gauge, set to each value.
    Gauge,

    /// Histogram, observes each value into buckets.
    Histogram,

    /// Summary, observes each value into quantiles.
    Summary,
}

impl MetricKind {
    /// All supported kinds, in the order they are listed in error messages.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Histogram,
        MetricKind::Summary,
    ];

    /// Kind used when a record does not declare one.
    pub const DEFAULT: MetricKind = MetricKind::Gauge;

    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }

    /// Comma-separated list of supported kinds.
    pub fn supported() -> String {
        MetricKind::ALL
            .iter()
            .map(MetricKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = crate::errors::UnsupportedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            "summary" => Ok(MetricKind::Summary),
            other => Err(crate::errors::UnsupportedTypeError {
                kind: other.to_string(),
            }),
        }
    }
}

/// Label shape of a record, decided once from the raw `label` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLabels {
    /// `label` is a non-empty string; extra top-level fields still become labels.
    Single {
        label: String,
        extra: BTreeMap<String, String>,
    },

    /// `label` is a mapping, used as-is. Extra top-level fields are ignored.
    Map(BTreeMap<String, String>),

    /// No usable `label`; every non-reserved top-level field becomes a label.
    Flat(BTreeMap<String, String>),
}

impl RecordLabels {
    /// Classify the label shape of a raw record object.
    pub fn from_record(record: &Map<String, Value>) -> Self {
        match record.get("label") {
            Some(Value::Object(map)) => RecordLabels::Map(label_entries(map.iter())),
            Some(Value::String(label)) if !label.is_empty() => RecordLabels::Single {
                label: label.clone(),
                extra: extra_fields(record),
            },
            _ => RecordLabels::Flat(extra_fields(record)),
        }
    }
}

fn extra_fields(record: &Map<String, Value>) -> BTreeMap<String, String> {
    label_entries(
        record
            .iter()
            .filter(|(key, _)| !RESERVED_RECORD_KEYS.contains(&key.as_str())),
    )
}

fn label_entries<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> BTreeMap<String, String> {
    entries
        .filter_map(|(key, value)| label_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Render a JSON value as a label value. `null` has no label value.
pub fn label_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// A metric record that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Metric name (non-empty).
    pub metric: String,

    /// Observed value.
    pub value: f64,

    /// Declared type, unparsed. Checked against the supported set downstream.
    pub kind: Option<String>,

    /// Help text for the metric, used only at creation.
    pub help: Option<String>,

    /// Label shape of the record.
    pub labels: RecordLabels,
}

impl MetricRecord {
    /// Help text to use when creating the metric object.
    pub fn help_or_default(&self) -> String {
        match &self.help {
            Some(help) => help.clone(),
            None => format!(
                "{} with type {}",
                self.metric,
                self.kind.as_deref().unwrap_or(MetricKind::DEFAULT.as_str())
            ),
        }
    }
}
