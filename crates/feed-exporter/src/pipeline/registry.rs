//! Metric registry.
//!
//! Process-wide table of metric objects keyed by metric name. Objects are
//! created on first sight of a name and live for the rest of the process.
//! Lookup and creation are one atomic step: a name is registered with the
//! exposition registry at most once, even when many events race on it.
//!
//! # Label set
//!
//! Every object uses the same label-name set: `label`, `job`, then the
//! configured additional label names, in that order.

use crate::errors::{ApplyError, RegistryError};
use crate::models::{MetricKind, MetricRecord, ResolvedLabels};
use crate::observability::metrics::{record_metric_created, OPERATIONAL_METRIC_PREFIX};
use crate::pipeline::labels::{JOB_LABEL, RECORD_LABEL};
use crate::pipeline::summary::SummaryVec;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Default histogram buckets, matching the Prometheus client defaults.
pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Options applied to every metric object the registry creates.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Label names appended after `label` and `job`.
    pub additional_label_names: Vec<String>,

    /// Bucket boundaries for histogram objects.
    pub histogram_buckets: Vec<f64>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            additional_label_names: Vec::new(),
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
        }
    }
}

/// Typed handle to the underlying metric vector.
#[derive(Clone)]
pub enum MetricHandle {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl MetricHandle {
    fn collector(&self) -> Box<dyn Collector> {
        match self {
            MetricHandle::Counter(vec) => Box::new(vec.clone()),
            MetricHandle::Gauge(vec) => Box::new(vec.clone()),
            MetricHandle::Histogram(vec) => Box::new(vec.clone()),
            MetricHandle::Summary(vec) => Box::new(vec.clone()),
        }
    }
}

/// A named, typed, labelled metric registered for exposition.
pub struct MetricObject {
    name: String,
    kind: MetricKind,
    help: String,
    label_names: Vec<String>,
    handle: MetricHandle,
}

impl MetricObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn handle(&self) -> &MetricHandle {
        &self.handle
    }

    /// Order resolved labels by this object's label names.
    ///
    /// Names with no resolved value are exported as the empty string. A
    /// resolved label outside the label-name set is an error.
    pub fn label_values(&self, labels: &ResolvedLabels) -> Result<Vec<String>, ApplyError> {
        if let Some(unknown) = labels.keys().find(|key| !self.label_names.contains(key)) {
            return Err(ApplyError::UnknownLabel {
                metric: self.name.clone(),
                label: unknown.clone(),
            });
        }

        Ok(self
            .label_names
            .iter()
            .map(|name| labels.get(name).cloned().unwrap_or_default())
            .collect())
    }
}

impl fmt::Debug for MetricObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricObject")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("help", &self.help)
            .field("label_names", &self.label_names)
            .finish_non_exhaustive()
    }
}

/// Name-keyed table of metric objects backed by a Prometheus registry.
pub struct MetricRegistry {
    registry: Registry,
    label_names: Vec<String>,
    histogram_buckets: Vec<f64>,
    metrics: RwLock<HashMap<String, Arc<MetricObject>>>,
}

impl MetricRegistry {
    /// Create a registry backed by a fresh Prometheus registry.
    pub fn new(options: RegistryOptions) -> Self {
        Self::with_registry(Registry::new(), options)
    }

    /// Create a registry that registers its objects into `registry`.
    pub fn with_registry(registry: Registry, options: RegistryOptions) -> Self {
        let mut label_names = vec![RECORD_LABEL.to_string(), JOB_LABEL.to_string()];
        for name in options.additional_label_names {
            if !label_names.contains(&name) {
                label_names.push(name);
            }
        }

        Self {
            registry,
            label_names,
            histogram_buckets: options.histogram_buckets,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Return the object for `record.metric`, creating it on first sight.
    ///
    /// An existing object is returned as-is, whatever type and help the
    /// record declares. On creation the record's type picks the kind (gauge
    /// when absent) and its help, or a generated one, becomes the help text.
    /// Names under the operational metric prefix are refused.
    pub fn resolve(&self, record: &MetricRecord) -> Result<Arc<MetricObject>, RegistryError> {
        if record.metric.starts_with(OPERATIONAL_METRIC_PREFIX) {
            return Err(RegistryError::ReservedName {
                metric: record.metric.clone(),
            });
        }

        if let Some(existing) = self.get(&record.metric) {
            return Ok(existing);
        }

        let mut metrics = self
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Another event may have created it between the read and the write lock
        if let Some(existing) = metrics.get(&record.metric) {
            return Ok(Arc::clone(existing));
        }

        let kind = match record.kind.as_deref() {
            Some(declared) => declared.parse::<MetricKind>()?,
            None => MetricKind::DEFAULT,
        };
        let object = Arc::new(self.create(&record.metric, kind, record.help_or_default())?);
        metrics.insert(record.metric.clone(), Arc::clone(&object));

        record_metric_created(kind.as_str());
        info!(
            target: "feed_exporter.pipeline",
            metric = %object.name,
            kind = %kind,
            "Created metric"
        );

        Ok(object)
    }

    /// Look up an existing object by name.
    pub fn get(&self, name: &str) -> Option<Arc<MetricObject>> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Number of metric objects created so far.
    pub fn len(&self) -> usize {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label names shared by every object.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Underlying Prometheus registry.
    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot of every registered family, for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Register baseline process metrics (CPU, memory, file descriptors).
    #[cfg(target_os = "linux")]
    pub fn register_process_collector(&self) -> Result<(), RegistryError> {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        self.registry
            .register(Box::new(collector))
            .map_err(|source| RegistryError::Registration {
                metric: "process".to_string(),
                source,
            })
    }

    /// Register baseline process metrics (CPU, memory, file descriptors).
    #[cfg(not(target_os = "linux"))]
    pub fn register_process_collector(&self) -> Result<(), RegistryError> {
        Err(RegistryError::ProcessMetricsUnsupported)
    }

    fn create(
        &self,
        name: &str,
        kind: MetricKind,
        help: String,
    ) -> Result<MetricObject, RegistryError> {
        let registration = |source: prometheus::Error| RegistryError::Registration {
            metric: name.to_string(),
            source,
        };
        let names: Vec<&str> = self.label_names.iter().map(String::as_str).collect();

        let handle = match kind {
            MetricKind::Counter => {
                CounterVec::new(Opts::new(name, help.as_str()), &names).map(MetricHandle::Counter)
            }
            MetricKind::Gauge => {
                GaugeVec::new(Opts::new(name, help.as_str()), &names).map(MetricHandle::Gauge)
            }
            MetricKind::Histogram => HistogramVec::new(
                HistogramOpts::new(name, help.as_str()).buckets(self.histogram_buckets.clone()),
                &names,
            )
            .map(MetricHandle::Histogram),
            MetricKind::Summary => {
                SummaryVec::new(name, &help, &names).map(MetricHandle::Summary)
            }
        }
        .map_err(registration)?;

        self.registry
            .register(handle.collector())
            .map_err(registration)?;

        Ok(MetricObject {
            name: name.to_string(),
            kind,
            help,
            label_names: self.label_names.clone(),
            handle,
        })
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("label_names", &self.label_names)
            .field("histogram_buckets", &self.histogram_buckets)
            .field("metrics", &self.len())
            .finish()
    }
}
