//! Feed Exporter configuration.
//!
//! Configuration is loaded from environment variables. Connection URLs are
//! redacted in Debug output.

use crate::models::{MetricKind, RESERVED_RECORD_KEYS};
use crate::pipeline::registry::DEFAULT_HISTOGRAM_BUCKETS;
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Default scrape server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3031";

/// Default scrape path.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Default database (schema) holding the collection.
pub const DEFAULT_DATABASE: &str = "public";

/// Default job label value.
pub const DEFAULT_JOB: &str = "feed_exporter";

/// Default bound on concurrently handled events.
pub const DEFAULT_MAX_IN_FLIGHT_EVENTS: usize = 64;

/// Default document field read by the built-in transform.
pub const DEFAULT_VALUE_FIELD: &str = "value";

/// Paths served by the health router, unavailable as scrape path.
const HEALTH_PATHS: [&str; 2] = ["/health", "/ready"];

/// Built-in field-mapping transform settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    /// Metric name of every record produced.
    pub metric: String,

    /// Dotted path of the numeric document field used as value.
    pub value_field: String,

    /// Declared metric type. Absent means gauge.
    pub kind: Option<MetricKind>,

    /// Value of the single `label` label.
    pub label: Option<String>,

    /// Dotted paths of document fields copied into labels.
    pub label_fields: Vec<String>,

    /// Help text for the metric.
    pub help: Option<String>,
}

impl TransformConfig {
    /// Label names produced by `label_fields`.
    pub fn label_names(&self) -> Vec<String> {
        self.label_fields.iter().map(|f| field_label_name(f)).collect()
    }
}

/// Label name for a dotted document field path.
pub fn field_label_name(field: &str) -> String {
    field.replace('.', "_")
}

/// Feed Exporter configuration.
#[derive(Clone)]
pub struct Config {
    /// Document store connection URL.
    pub database_url: SecretString,

    /// Change feed connection URL (default: `database_url`).
    pub feed_database_url: SecretString,

    /// Database (schema) holding the collection (default: "public").
    pub database: String,

    /// Collection (table) whose changes are exported.
    pub collection: String,

    /// Notification channel (default: "<collection>_changes").
    pub channel: String,

    /// Value of the `job` label (default: "feed_exporter").
    pub job: String,

    /// Extra label names every metric carries.
    pub additional_label_names: Vec<String>,

    /// Scrape server bind address (default: "0.0.0.0:3031").
    pub bind_address: String,

    /// Scrape path (default: "/metrics").
    pub metrics_path: String,

    /// Whether to export baseline process metrics.
    pub default_metrics: bool,

    /// Bound on concurrently handled events (default: 64).
    pub max_in_flight_events: usize,

    /// Bucket boundaries for histogram metrics.
    pub histogram_buckets: Vec<f64>,

    /// Built-in transform settings.
    pub transform: TransformConfig,
}

/// Custom Debug implementation that redacts connection URLs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("feed_database_url", &"[REDACTED]")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("channel", &self.channel)
            .field("job", &self.job)
            .field("additional_label_names", &self.additional_label_names)
            .field("bind_address", &self.bind_address)
            .field("metrics_path", &self.metrics_path)
            .field("default_metrics", &self.default_metrics)
            .field("max_in_flight_events", &self.max_in_flight_events)
            .field("histogram_buckets", &self.histogram_buckets)
            .field("transform", &self.transform)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;
        let feed_database_url = SecretString::from(
            optional(vars, "FEED_DATABASE_URL").unwrap_or_else(|| database_url.clone()),
        );
        let database_url = SecretString::from(database_url);

        let database = optional(vars, "FEED_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let collection = required(vars, "FEED_COLLECTION")?;
        let channel =
            optional(vars, "FEED_CHANNEL").unwrap_or_else(|| format!("{collection}_changes"));
        for (key, value) in [
            ("FEED_DATABASE", &database),
            ("FEED_COLLECTION", &collection),
            ("FEED_CHANNEL", &channel),
        ] {
            if !is_identifier(value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be a plain identifier, got '{value}'"
                )));
            }
        }

        let job = optional(vars, "METRICS_JOB").unwrap_or_else(|| DEFAULT_JOB.to_string());

        let additional_label_names = comma_list(vars, "METRICS_ADDITIONAL_LABELS");
        for name in &additional_label_names {
            if !is_label_name(name) {
                return Err(ConfigError::InvalidValue(format!(
                    "METRICS_ADDITIONAL_LABELS contains invalid label name '{name}'"
                )));
            }
        }

        let bind_address =
            optional(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        if bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "BIND_ADDRESS must be host:port, got '{bind_address}'"
            )));
        }

        let metrics_path =
            optional(vars, "METRICS_PATH").unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string());
        if !metrics_path.starts_with('/') || HEALTH_PATHS.contains(&metrics_path.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "METRICS_PATH must start with '/' and not be a health path, got '{metrics_path}'"
            )));
        }

        let default_metrics = match optional(vars, "DEFAULT_METRICS") {
            None => false,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "DEFAULT_METRICS must be true or false, got '{value}'"
                ))
            })?,
        };

        let max_in_flight_events = match optional(vars, "MAX_IN_FLIGHT_EVENTS") {
            None => DEFAULT_MAX_IN_FLIGHT_EVENTS,
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        "MAX_IN_FLIGHT_EVENTS must be a positive integer, got '{value}'"
                    ))
                })?,
        };

        let histogram_buckets = match optional(vars, "HISTOGRAM_BUCKETS") {
            None => DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
            Some(value) => parse_buckets(&value).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "HISTOGRAM_BUCKETS must be increasing comma-separated numbers, got '{value}'"
                ))
            })?,
        };

        let transform = transform_from_vars(vars)?;

        Ok(Config {
            database_url,
            feed_database_url,
            database,
            collection,
            channel,
            job,
            additional_label_names,
            bind_address,
            metrics_path,
            default_metrics,
            max_in_flight_events,
            histogram_buckets,
            transform,
        })
    }

    /// Label names beyond `label` and `job` that metrics carry: the
    /// configured additional names, then the transform's label fields.
    pub fn registry_label_names(&self) -> Vec<String> {
        let mut names = self.additional_label_names.clone();
        for name in self.transform.label_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

fn transform_from_vars(vars: &HashMap<String, String>) -> Result<TransformConfig, ConfigError> {
    let metric = required(vars, "TRANSFORM_METRIC")?;
    if !is_metric_name(&metric) {
        return Err(ConfigError::InvalidValue(format!(
            "TRANSFORM_METRIC is not a valid metric name: '{metric}'"
        )));
    }

    let value_field =
        optional(vars, "TRANSFORM_VALUE_FIELD").unwrap_or_else(|| DEFAULT_VALUE_FIELD.to_string());

    let kind = optional(vars, "TRANSFORM_TYPE")
        .map(|value| value.parse::<MetricKind>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue(format!("TRANSFORM_TYPE: {e}")))?;

    let label_fields = comma_list(vars, "TRANSFORM_LABEL_FIELDS");
    for field in &label_fields {
        let name = field_label_name(field);
        if !is_label_name(&name) || RESERVED_RECORD_KEYS.contains(&name.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "TRANSFORM_LABEL_FIELDS entry '{field}' cannot be used as label name"
            )));
        }
    }

    Ok(TransformConfig {
        metric,
        value_field,
        kind,
        label: optional(vars, "TRANSFORM_LABEL"),
        label_fields,
        help: optional(vars, "TRANSFORM_HELP"),
    })
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    optional(vars, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// A variable set to the empty string counts as unset.
fn optional(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn comma_list(vars: &HashMap<String, String>, key: &str) -> Vec<String> {
    optional(vars, key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_buckets(value: &str) -> Option<Vec<f64>> {
    let buckets = value
        .split(',')
        .map(|s| s.trim().parse::<f64>().ok().filter(|b| b.is_finite()))
        .collect::<Option<Vec<f64>>>()?;

    let increasing = buckets.windows(2).all(|w| matches!(w, [a, b] if a < b));
    (!buckets.is_empty() && increasing).then_some(buckets)
}

/// Schema, table, and channel names: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    value.len() <= 63
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prometheus label name: `[a-zA-Z_][a-zA-Z0-9_]*`, not starting with `__`.
fn is_label_name(value: &str) -> bool {
    let mut chars = value.chars();
    !value.starts_with("__")
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Prometheus metric name: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_metric_name(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
