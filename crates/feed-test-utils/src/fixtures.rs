//! Notification and transform fixtures.

use feed_exporter::errors::TransformError;
use feed_exporter::models::{ChangeNotification, Document, DocumentRef, Operation};
use serde_json::{json, Value};

/// Collection used by the harness.
pub const COLLECTION: &str = "requests";

/// Job name used by the harness.
pub const JOB: &str = "test_job";

/// Insert notification for `id`.
pub fn insert(id: &str) -> ChangeNotification {
    ChangeNotification::insert(id)
}

/// Update notification for `id`.
pub fn update(id: &str) -> ChangeNotification {
    ChangeNotification::update(id)
}

/// Delete notification for `id`.
pub fn delete(id: &str) -> ChangeNotification {
    ChangeNotification {
        operation: Operation::Delete,
        before: Some(DocumentRef::with_id(id)),
        after: None,
    }
}

/// Update notification carrying only a before-image.
pub fn update_before_only(id: &str) -> ChangeNotification {
    ChangeNotification {
        operation: Operation::Update,
        before: Some(DocumentRef::with_id(id)),
        after: None,
    }
}

/// Build a document from a JSON object literal.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Emits `test_metric` as a counter labelled `test`, valued by the
/// document's `total` field.
pub fn counter_transform(doc: &Document) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({
        "metric": "test_metric",
        "value": doc.get("total").cloned().unwrap_or(Value::Null),
        "type": "counter",
        "label": "test"
    })))
}

/// Emits the document itself as the record.
pub fn passthrough_transform(doc: &Document) -> Result<Option<Value>, TransformError> {
    Ok(Some(Value::Object(doc.clone())))
}

/// Fails for every document.
pub fn failing_transform(_doc: &Document) -> Result<Option<Value>, TransformError> {
    Err(TransformError::new("transform failed"))
}
