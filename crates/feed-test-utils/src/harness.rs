//! Pipeline harness for integration tests.

use crate::fixtures::{COLLECTION, JOB};
use feed_exporter::errors::FeedError;
use feed_exporter::feed::ChangeFeed;
use feed_exporter::models::ChangeNotification;
use feed_exporter::observability::HealthState;
use feed_exporter::pipeline::{MetricHandle, MetricRegistry, Pipeline, RegistryOptions};
use feed_exporter::store::mock::InMemoryDocumentStore;
use feed_exporter::tasks::{run_feed_supervisor, FeedSupervisorConfig};
use feed_exporter::transform::Transform;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// In-memory store, fresh registry and a pipeline over both.
pub struct PipelineHarness {
    pub store: Arc<InMemoryDocumentStore>,
    pub registry: Arc<MetricRegistry>,
    pub pipeline: Arc<Pipeline>,
}

impl PipelineHarness {
    /// Harness with the default registry options.
    pub fn new(transform: impl Transform + 'static) -> Self {
        Self::with_options(transform, RegistryOptions::default())
    }

    pub fn with_options(transform: impl Transform + 'static, options: RegistryOptions) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let registry = Arc::new(MetricRegistry::new(options));
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(transform),
            Arc::clone(&registry),
            COLLECTION,
            JOB,
        ));

        Self {
            store,
            registry,
            pipeline,
        }
    }

    /// Current value of a counter series, if the metric is a counter.
    pub fn counter(&self, metric: &str, label_values: &[&str]) -> Option<f64> {
        match self.registry.get(metric)?.handle() {
            MetricHandle::Counter(vec) => Some(vec.with_label_values(label_values).get()),
            _ => None,
        }
    }

    /// Current value of a gauge series, if the metric is a gauge.
    pub fn gauge(&self, metric: &str, label_values: &[&str]) -> Option<f64> {
        match self.registry.get(metric)?.handle() {
            MetricHandle::Gauge(vec) => Some(vec.with_label_values(label_values).get()),
            _ => None,
        }
    }

    /// Observation count of a histogram or summary series.
    pub fn sample_count(&self, metric: &str, label_values: &[&str]) -> Option<u64> {
        match self.registry.get(metric)?.handle() {
            MetricHandle::Histogram(vec) => {
                Some(vec.with_label_values(label_values).get_sample_count())
            }
            MetricHandle::Summary(vec) => vec.sample_count(label_values),
            _ => None,
        }
    }

    /// Run a feed supervisor over `feed` in the background.
    pub fn spawn_supervisor(
        &self,
        feed: Arc<dyn ChangeFeed>,
        health: Arc<HealthState>,
        max_in_flight: usize,
    ) -> (CancellationToken, JoinHandle<()>) {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run_feed_supervisor(
            feed,
            Arc::clone(&self.pipeline),
            health,
            FeedSupervisorConfig::new(max_in_flight),
            cancel_token.clone(),
        ));
        (cancel_token, handle)
    }
}

/// Wrap notifications as successful feed items.
pub fn feed_items(notifications: Vec<ChangeNotification>) -> Vec<Result<ChangeNotification, FeedError>> {
    notifications.into_iter().map(Ok).collect()
}
