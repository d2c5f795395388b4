//! Summary metric vector.
//!
//! The `prometheus` crate ships counters, gauges and histograms but no
//! summary, so this module provides a labelled summary as a custom
//! [`Collector`]. Each label combination tracks a running count and sum plus
//! a bounded window of recent observations from which quantiles are computed
//! at scrape time.

use prometheus::core::{Collector, Desc};
use prometheus::proto::{LabelPair, Metric, MetricFamily, MetricType, Quantile, Summary};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Quantiles reported for every series.
pub const DEFAULT_QUANTILES: [f64; 7] = [0.01, 0.05, 0.5, 0.9, 0.95, 0.99, 0.999];

/// Number of recent observations kept per series for quantile estimation.
pub const DEFAULT_WINDOW: usize = 1024;

/// Labelled summary. Cloning yields another handle to the same series.
#[derive(Clone)]
pub struct SummaryVec {
    inner: Arc<SummaryInner>,
}

struct SummaryInner {
    desc: Desc,
    label_names: Vec<String>,
    window: usize,
    series: Mutex<BTreeMap<Vec<String>, Series>>,
}

#[derive(Default)]
struct Series {
    count: u64,
    sum: f64,
    recent: VecDeque<f64>,
}

impl SummaryVec {
    /// Create a summary vector.
    ///
    /// Fails if the metric name, help, or a label name is rejected by
    /// the exposition library.
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> prometheus::Result<Self> {
        let label_names: Vec<String> = label_names.iter().map(|s| s.to_string()).collect();
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            label_names.clone(),
            HashMap::new(),
        )?;

        Ok(Self {
            inner: Arc::new(SummaryInner {
                desc,
                label_names,
                window: DEFAULT_WINDOW,
                series: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    /// Record one observation for the given label values.
    ///
    /// Label values are positional, in the order of the vector's label names.
    pub fn observe(&self, label_values: &[&str], value: f64) -> prometheus::Result<()> {
        let expect = self.inner.label_names.len();
        if label_values.len() != expect {
            return Err(prometheus::Error::InconsistentCardinality {
                expect,
                got: label_values.len(),
            });
        }

        let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
        let mut series = self.lock_series();
        let entry = series.entry(key).or_default();
        entry.count += 1;
        entry.sum += value;
        entry.recent.push_back(value);
        if entry.recent.len() > self.inner.window {
            entry.recent.pop_front();
        }

        Ok(())
    }

    /// Number of observations for the given label values.
    pub fn sample_count(&self, label_values: &[&str]) -> Option<u64> {
        self.with_series(label_values, |s| s.count)
    }

    /// Sum of observations for the given label values.
    pub fn sample_sum(&self, label_values: &[&str]) -> Option<f64> {
        self.with_series(label_values, |s| s.sum)
    }

    fn with_series<T>(&self, label_values: &[&str], f: impl FnOnce(&Series) -> T) -> Option<T> {
        let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
        self.lock_series().get(&key).map(f)
    }

    fn lock_series(&self) -> MutexGuard<'_, BTreeMap<Vec<String>, Series>> {
        self.inner
            .series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut family = MetricFamily::default();
        family.set_name(self.inner.desc.fq_name.clone());
        family.set_help(self.inner.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        let series = self.lock_series();
        for (label_values, s) in series.iter() {
            let mut pairs: Vec<LabelPair> = self
                .inner
                .label_names
                .iter()
                .zip(label_values)
                .map(|(name, value)| {
                    let mut pair = LabelPair::default();
                    pair.set_name(name.clone());
                    pair.set_value(value.clone());
                    pair
                })
                .collect();
            pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

            let mut sorted: Vec<f64> = s.recent.iter().copied().collect();
            sorted.sort_by(f64::total_cmp);

            let mut summary = Summary::default();
            summary.set_sample_count(s.count);
            summary.set_sample_sum(s.sum);
            for q in DEFAULT_QUANTILES {
                let mut quantile = Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(quantile_of(&sorted, q));
                summary.mut_quantile().push(quantile);
            }

            let mut metric = Metric::default();
            for pair in pairs {
                metric.mut_label().push(pair);
            }
            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}

/// Nearest-rank quantile over sorted observations. NaN when empty.
fn quantile_of(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let rank = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted.get(rank).copied().unwrap_or(f64::NAN)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn summary() -> SummaryVec {
        SummaryVec::new("latency_seconds", "Request latency", &["label", "job"]).unwrap()
    }

    #[test]
    fn test_observe_accumulates_count_and_sum() {
        let vec = summary();
        vec.observe(&["test", "job"], 1.0).unwrap();
        vec.observe(&["test", "job"], 2.0).unwrap();

        assert_eq!(vec.sample_count(&["test", "job"]), Some(2));
        assert_eq!(vec.sample_sum(&["test", "job"]), Some(3.0));
        assert_eq!(vec.sample_count(&["other", "job"]), None);
    }

    #[test]
    fn test_observe_rejects_wrong_cardinality() {
        let vec = summary();
        let result = vec.observe(&["only-one"], 1.0);
        assert!(matches!(
            result,
            Err(prometheus::Error::InconsistentCardinality { expect: 2, got: 1 })
        ));
    }

    #[test]
    fn test_invalid_metric_name_is_rejected() {
        assert!(SummaryVec::new("bad-name", "help", &["label"]).is_err());
    }

    #[test]
    fn test_collect_reports_summary_family() {
        let vec = summary();
        for v in 1..=100 {
            vec.observe(&["test", "job"], f64::from(v)).unwrap();
        }

        let families = vec.collect();
        assert_eq!(families.len(), 1);
        let family = families.first().unwrap();
        assert_eq!(family.get_name(), "latency_seconds");
        assert_eq!(family.get_field_type(), MetricType::SUMMARY);

        let metric = family.get_metric().first().unwrap();
        let summary = metric.get_summary();
        assert_eq!(summary.get_sample_count(), 100);
        assert_eq!(summary.get_sample_sum(), 5050.0);
        assert_eq!(summary.get_quantile().len(), DEFAULT_QUANTILES.len());

        let median = summary
            .get_quantile()
            .iter()
            .find(|q| q.get_quantile() == 0.5)
            .unwrap();
        assert!((median.get_value() - 50.0).abs() <= 1.0);

        let label_names: Vec<&str> = metric.get_label().iter().map(|l| l.get_name()).collect();
        assert_eq!(label_names, vec!["job", "label"]);
    }

    #[test]
    fn test_window_is_bounded_but_totals_are_not() {
        let vec = summary();
        for _ in 0..(DEFAULT_WINDOW + 10) {
            vec.observe(&["a", "b"], 1.0).unwrap();
        }

        let count = vec.sample_count(&["a", "b"]).unwrap();
        assert_eq!(count as usize, DEFAULT_WINDOW + 10);
        let guard = vec.lock_series();
        let series = guard.get(&vec!["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(series.recent.len(), DEFAULT_WINDOW);
    }

    #[test]
    fn test_quantile_of_empty_is_nan() {
        assert!(quantile_of(&[], 0.5).is_nan());
        assert_eq!(quantile_of(&[3.0], 0.99), 3.0);
    }
}
