//! Label resolution.
//!
//! Merges, in increasing precedence: the job label, the record's single
//! `label` string, and the record's multi-label mapping (either the nested
//! `label` object or the record's extra top-level fields).

use crate::models::{MetricRecord, RecordLabels, ResolvedLabels};

/// Name of the label carrying the configured job.
pub const JOB_LABEL: &str = "job";

/// Name of the label carrying the record's single `label` string.
pub const RECORD_LABEL: &str = "label";

/// Compute the final label mapping for a record. Deterministic and pure.
pub fn resolve_labels(record: &MetricRecord, job: &str) -> ResolvedLabels {
    let mut labels = ResolvedLabels::from([(JOB_LABEL.to_string(), job.to_string())]);

    match &record.labels {
        RecordLabels::Single { label, extra } => {
            labels.insert(RECORD_LABEL.to_string(), label.clone());
            labels.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        RecordLabels::Map(multi) | RecordLabels::Flat(multi) => {
            labels.extend(multi.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    labels
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::validate;
    use serde_json::json;

    const JOB: &str = "feed_exporter";

    fn labels_for(raw: serde_json::Value) -> ResolvedLabels {
        let record = validate(&raw).expect("record should validate");
        resolve_labels(&record, JOB)
    }

    fn expected(pairs: &[(&str, &str)]) -> ResolvedLabels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_nested_label_mapping() {
        let labels = labels_for(json!({
            "metric": "test_label_1",
            "value": 1,
            "type": "gauge",
            "label": {"label": "test", "method": "get"}
        }));

        assert_eq!(
            labels,
            expected(&[("job", JOB), ("label", "test"), ("method", "get")])
        );
    }

    #[test]
    fn test_flat_extra_fields() {
        let labels = labels_for(json!({
            "metric": "test_label_1",
            "value": 1,
            "type": "gauge",
            "label": "test",
            "method": "get"
        }));

        assert_eq!(
            labels,
            expected(&[("job", JOB), ("label", "test"), ("method", "get")])
        );
    }

    #[test]
    fn test_nested_and_flat_resolve_identically() {
        let nested = labels_for(json!({
            "metric": "m", "value": 1, "label": {"label": "test", "method": "get"}
        }));
        let flat = labels_for(json!({
            "metric": "m", "value": 1, "label": "test", "method": "get"
        }));

        assert_eq!(nested, flat);
    }

    #[test]
    fn test_job_only_when_no_labels() {
        let labels = labels_for(json!({"metric": "m", "value": 1, "type": "counter"}));
        assert_eq!(labels, expected(&[("job", JOB)]));
    }

    #[test]
    fn test_multi_overrides_single_and_job() {
        let labels = labels_for(json!({
            "metric": "m",
            "value": 1,
            "label": "from_single",
            "job": "override"
        }));

        assert_eq!(
            labels,
            expected(&[("job", "override"), ("label", "from_single")])
        );
    }

    #[test]
    fn test_mapping_can_override_job() {
        let labels = labels_for(json!({
            "metric": "m",
            "value": 1,
            "label": {"job": "other"}
        }));

        assert_eq!(labels, expected(&[("job", "other")]));
    }

    #[test]
    fn test_reserved_keys_never_become_labels() {
        let labels = labels_for(json!({
            "metric": "m",
            "value": 1,
            "help": "h",
            "type": "gauge",
            "region": "eu"
        }));

        assert_eq!(labels, expected(&[("job", JOB), ("region", "eu")]));
    }
}
