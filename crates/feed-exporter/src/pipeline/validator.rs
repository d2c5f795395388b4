//! Metric record validation.
//!
//! Checks a raw record produced by the transform against the shape rules,
//! in order, and returns the typed [`MetricRecord`] on success. Pure.

use crate::errors::{RecordField, ValidationError};
use crate::models::{MetricRecord, RecordLabels};
use serde_json::Value;

/// Validate a raw record and convert it to a typed record.
///
/// Rules, checked in this order:
/// 1. `metric` and `value` both present (non-null, `metric` not empty)
/// 2. `metric` is a string
/// 3. `value` is a number
/// 4. `help`, if present, is a string
/// 5. `type`, if present, is a string
///
/// A raw record that is not a JSON object has neither field.
pub fn validate(raw: &Value) -> Result<MetricRecord, ValidationError> {
    let record = raw.as_object().ok_or(ValidationError::MissingField)?;

    let metric = present(record.get("metric"));
    let value = present(record.get("value"));

    let (Some(metric), Some(value)) = (metric, value) else {
        return Err(ValidationError::MissingField);
    };

    let metric = match metric {
        Value::String(name) => name.clone(),
        _ => return Err(ValidationError::WrongType(RecordField::Metric)),
    };

    let value = value
        .as_f64()
        .ok_or(ValidationError::WrongType(RecordField::Value))?;

    let help = optional_string(record.get("help"), RecordField::Help)?;
    let kind = optional_string(record.get("type"), RecordField::Type)?;

    Ok(MetricRecord {
        metric,
        value,
        kind,
        help,
        labels: RecordLabels::from_record(record),
    })
}

/// A field counts as present when it is set to something other than
/// `null` or the empty string.
fn present(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v),
    }
}

fn optional_string(
    value: Option<&Value>,
    field: RecordField,
) -> Result<Option<String>, ValidationError> {
    match present(value) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::WrongType(field)),
    }
}
