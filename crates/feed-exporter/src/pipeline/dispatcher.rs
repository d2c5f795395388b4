//! Value dispatch.
//!
//! Applies one value to a metric object according to its type: counters
//! increment, gauges set, histograms and summaries observe.

use crate::errors::ApplyError;
use crate::models::{MetricKind, ResolvedLabels};
use crate::pipeline::registry::{MetricHandle, MetricObject};

/// Apply `value` under `labels` to `object`.
///
/// `record_type` is the type the record declared. Absent means "whatever the
/// object already is". A declared type must be supported and must match the
/// object's type.
pub fn apply(
    object: &MetricObject,
    record_type: Option<&str>,
    labels: &ResolvedLabels,
    value: f64,
) -> Result<(), ApplyError> {
    let requested = match record_type {
        Some(declared) => declared.parse::<MetricKind>()?,
        None => object.kind(),
    };

    if requested != object.kind() {
        return Err(ApplyError::TypeMismatch {
            metric: object.name().to_string(),
            registered: object.kind(),
            requested,
        });
    }

    let values = object.label_values(labels)?;
    let values: Vec<&str> = values.iter().map(String::as_str).collect();
    let exposition = |source: prometheus::Error| ApplyError::Exposition {
        metric: object.name().to_string(),
        source,
    };

    match object.handle() {
        MetricHandle::Counter(vec) => {
            if value < 0.0 {
                return Err(ApplyError::NegativeCounter {
                    metric: object.name().to_string(),
                    value,
                });
            }
            vec.get_metric_with_label_values(&values)
                .map_err(exposition)?
                .inc_by(value);
        }
        MetricHandle::Gauge(vec) => {
            vec.get_metric_with_label_values(&values)
                .map_err(exposition)?
                .set(value);
        }
        MetricHandle::Histogram(vec) => {
            vec.get_metric_with_label_values(&values)
                .map_err(exposition)?
                .observe(value);
        }
        MetricHandle::Summary(vec) => {
            vec.observe(&values, value).map_err(exposition)?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::registry::{MetricRegistry, RegistryOptions};
    use crate::pipeline::validate;
    use serde_json::json;
    use std::sync::Arc;

    fn labels(pairs: &[(&str, &str)]) -> ResolvedLabels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn counter_value(object: &MetricObject, values: &[&str]) -> Option<f64> {
        match object.handle() {
            MetricHandle::Counter(vec) => Some(vec.with_label_values(values).get()),
            _ => None,
        }
    }

    fn gauge_value(object: &MetricObject, values: &[&str]) -> Option<f64> {
        match object.handle() {
            MetricHandle::Gauge(vec) => Some(vec.with_label_values(values).get()),
            _ => None,
        }
    }

    fn object(registry: &MetricRegistry, name: &str, kind: &str) -> Arc<MetricObject> {
        registry
            .resolve(&validate(&json!({"metric": name, "value": 0, "type": kind})).unwrap())
            .unwrap()
    }

    #[test]
    fn test_counter_increments() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let counter = object(&registry, "c", "counter");
        let l = labels(&[("label", "test"), ("job", "j")]);

        apply(&counter, Some("counter"), &l, 1.0).unwrap();
        apply(&counter, None, &l, 2.5).unwrap();

        assert_eq!(counter_value(&counter, &["test", "j"]), Some(3.5));
    }

    #[test]
    fn test_gauge_sets_last_value() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let gauge = object(&registry, "g", "gauge");
        let l = labels(&[("job", "j")]);

        apply(&gauge, Some("gauge"), &l, 10.0).unwrap();
        apply(&gauge, Some("gauge"), &l, -4.0).unwrap();

        assert_eq!(gauge_value(&gauge, &["", "j"]), Some(-4.0));
    }

    #[test]
    fn test_histogram_and_summary_observe() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let histogram = object(&registry, "h", "histogram");
        let summary = object(&registry, "s", "summary");
        let l = labels(&[("label", "x"), ("job", "j")]);

        assert!(matches!(histogram.handle(), MetricHandle::Histogram(_)));
        apply(&histogram, Some("histogram"), &l, 0.2).unwrap();
        apply(&histogram, Some("histogram"), &l, 0.4).unwrap();
        apply(&summary, Some("summary"), &l, 7.0).unwrap();

        if let MetricHandle::Histogram(vec) = histogram.handle() {
            let child = vec.with_label_values(&["x", "j"]);
            assert_eq!(child.get_sample_count(), 2);
            assert!((child.get_sample_sum() - 0.6).abs() < 1e-9);
        }

        assert!(matches!(summary.handle(), MetricHandle::Summary(_)));
        if let MetricHandle::Summary(vec) = summary.handle() {
            assert_eq!(vec.sample_count(&["x", "j"]), Some(1));
            assert_eq!(vec.sample_sum(&["x", "j"]), Some(7.0));
        }
    }

    #[test]
    fn test_unsupported_declared_type() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let gauge = object(&registry, "g", "gauge");

        let result = apply(&gauge, Some("unknown"), &labels(&[]), 1.0);
        let error = result.unwrap_err();
        assert!(matches!(error, ApplyError::UnsupportedType(_)));
        assert_eq!(
            error.to_string(),
            "The record type unknown is not supported. Please use one of the following: counter, gauge, histogram, summary."
        );
    }

    #[test]
    fn test_type_mismatch_changes_nothing() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let counter = object(&registry, "c", "counter");
        let l = labels(&[("job", "j")]);

        let result = apply(&counter, Some("gauge"), &l, 5.0);
        assert!(matches!(
            result,
            Err(ApplyError::TypeMismatch {
                registered: MetricKind::Counter,
                requested: MetricKind::Gauge,
                ..
            })
        ));
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn test_negative_counter_rejected() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let counter = object(&registry, "c", "counter");

        let result = apply(&counter, None, &labels(&[("job", "j")]), -1.0);
        assert!(matches!(result, Err(ApplyError::NegativeCounter { .. })));
    }

    #[test]
    fn test_unknown_label_rejected() {
        let registry = MetricRegistry::new(RegistryOptions::default());
        let gauge = object(&registry, "g", "gauge");

        let result = apply(&gauge, None, &labels(&[("method", "get")]), 1.0);
        assert!(matches!(result, Err(ApplyError::UnknownLabel { .. })));
    }
}
