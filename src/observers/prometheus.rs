//! Prometheus observer for exporting counters using the official `prometheus` crate.
//!
//! This module provides [`PrometheusObserver`], which turns a
//! [`StatsSnapshot`] into Prometheus metrics and renders them with the
//! official text exposition format. Per-processor snapshots can be rendered
//! with a `processor` label so a dashboard can show how load spreads over
//! processors.
//!
//! # Feature Flag
//!
//! This module requires the `prometheus` feature:
//!
//! ```toml
//! [dependencies]
//! shardstat = { version = "0.1", features = ["prometheus"] }
//! ```
//!
//! # Integration with Prometheus
//!
//! 1. Take a snapshot with [`Stats::snapshot`](crate::Stats::snapshot)
//! 2. Call [`PrometheusObserver::render`] to get the exposition format string
//! 3. Serve this string on an HTTP `/metrics` endpoint
//!
//! # Examples
//!
//! ```rust,ignore
//! use shardstat::observers::prometheus::{MetricType, PrometheusObserver};
//! use shardstat::Granularity;
//!
//! let observer = PrometheusObserver::new()
//!     .with_namespace("myapp")
//!     .with_const_label("instance", "localhost:8080")
//!     .with_help("requests", "Total requests served");
//!
//! let output = observer.render(&shardstat::global().snapshot(Granularity::Global))?;
//! // # HELP myapp_requests Total requests served
//! // # TYPE myapp_requests counter
//! // myapp_requests{instance="localhost:8080"} 1234
//! # Ok::<(), shardstat::observers::ObserverError>(())
//! ```
//!
//! Per processor:
//!
//! ```rust,ignore
//! let output = observer.render_per_processor(&stats.processor_snapshot())?;
//! // myapp_requests{instance="localhost:8080",processor="0"} 600
//! // myapp_requests{instance="localhost:8080",processor="1"} 634
//! ```

use std::collections::HashMap;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use super::{PrometheusError, Result};
use crate::snapshot::{ProcessorSnapshot, StatsSnapshot};

/// Label added by [`PrometheusObserver::render_per_processor`].
pub const PROCESSOR_LABEL: &str = "processor";

/// Prometheus metric type.
///
/// Determines how the metric is registered and displayed in Prometheus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricType {
    /// A counter is a cumulative metric that only ever goes up.
    /// Use for metrics like total requests, errors, bytes sent.
    #[default]
    Counter,
    /// A gauge can go up and down.
    /// Use for counters that are sampled per interval, or values that are
    /// compared across processors.
    Gauge,
}

/// Configuration for a specific metric.
#[derive(Debug, Clone, Default)]
pub struct MetricConfig {
    /// The type of metric (Counter or Gauge).
    pub metric_type: MetricType,
    /// Help text describing the metric.
    pub help: Option<String>,
    /// Additional labels specific to this metric.
    pub labels: HashMap<String, String>,
}

/// Observer that exports counter snapshots to Prometheus format.
///
/// Each render builds a fresh [`Registry`], so rendering the same observer
/// repeatedly never fails on already registered metrics. Two counters whose
/// names sanitize to the same metric name make the render fail.
#[derive(Debug, Clone)]
pub struct PrometheusObserver {
    /// Namespace (prefix) for all metrics.
    namespace: Option<String>,
    /// Subsystem for all metrics.
    subsystem: Option<String>,
    /// Constant labels applied to all metrics.
    const_labels: HashMap<String, String>,
    /// Per-metric configuration, keyed by counter name.
    metric_configs: HashMap<String, MetricConfig>,
    /// Default metric type when not specified.
    default_type: MetricType,
    /// Whether counters with a zero value are left out.
    skip_zero: bool,
}

impl Default for PrometheusObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// One sample of a metric: its label values and value.
struct Sample {
    labels: Vec<(String, String)>,
    value: u64,
}

impl PrometheusObserver {
    /// Creates a new `PrometheusObserver`.
    pub fn new() -> Self {
        Self {
            namespace: None,
            subsystem: None,
            const_labels: HashMap::new(),
            metric_configs: HashMap::new(),
            default_type: MetricType::Counter,
            skip_zero: false,
        }
    }

    /// Sets the namespace (prefix) for all metrics.
    ///
    /// The namespace is prepended to metric names with an underscore.
    /// For example, namespace "myapp" + metric "requests" = "myapp_requests".
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Sets the subsystem for all metrics.
    ///
    /// The subsystem appears between namespace and metric name.
    /// For example, namespace "myapp" + subsystem "http" + metric "requests" = "myapp_http_requests".
    pub fn with_subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.to_string());
        self
    }

    /// Adds a constant label to all metrics.
    pub fn with_const_label(mut self, name: &str, value: &str) -> Self {
        self.const_labels
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Sets the default metric type for metrics without explicit configuration.
    pub fn with_default_type(mut self, metric_type: MetricType) -> Self {
        self.default_type = metric_type;
        self
    }

    /// Configures a specific metric.
    pub fn with_metric_config(mut self, name: &str, config: MetricConfig) -> Self {
        self.metric_configs.insert(name.to_string(), config);
        self
    }

    /// Sets the metric type for a specific metric.
    pub fn with_type(mut self, name: &str, metric_type: MetricType) -> Self {
        self.metric_configs
            .entry(name.to_string())
            .or_default()
            .metric_type = metric_type;
        self
    }

    /// Sets the help text for a specific metric.
    pub fn with_help(mut self, name: &str, help: &str) -> Self {
        self.metric_configs
            .entry(name.to_string())
            .or_default()
            .help = Some(help.to_string());
        self
    }

    /// Leaves counters with a zero value out of the output.
    pub fn skip_zero(mut self, enabled: bool) -> Self {
        self.skip_zero = enabled;
        self
    }

    /// Sanitizes a metric name to be Prometheus-compatible.
    ///
    /// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    fn sanitize_name(name: &str) -> String {
        let mut result = String::with_capacity(name.len());
        for c in name.chars() {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                result.push(c);
            } else if c == '-' || c == '.' || c == ' ' || c == '/' {
                result.push('_');
            }
        }
        if result.is_empty() {
            result.push_str("unnamed");
        }
        // Ensure name doesn't start with a digit
        if result
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            result.insert(0, '_');
        }
        result
    }

    /// Builds the full metric name with namespace and subsystem.
    fn build_full_name(&self, name: &str) -> String {
        let sanitized = Self::sanitize_name(name);
        match (&self.namespace, &self.subsystem) {
            (Some(ns), Some(ss)) => format!("{}_{}_{}", ns, ss, sanitized),
            (Some(ns), None) => format!("{}_{}", ns, sanitized),
            (None, Some(ss)) => format!("{}_{}", ss, sanitized),
            (None, None) => sanitized,
        }
    }

    /// Constant labels merged with the metric's own labels, sorted by name.
    fn labels_for(&self, config: Option<&MetricConfig>) -> Vec<(String, String)> {
        let mut labels = self.const_labels.clone();
        if let Some(cfg) = config {
            labels.extend(cfg.labels.clone());
        }
        let mut labels: Vec<_> = labels.into_iter().collect();
        labels.sort();
        labels
    }

    /// Renders a snapshot to Prometheus exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if metric creation, registration, or encoding fails.
    pub fn render(&self, snapshot: &StatsSnapshot) -> Result<String> {
        let registry = Registry::new();

        for counter in &snapshot.counters {
            if self.skip_zero && counter.value == 0 {
                continue;
            }
            let config = self.metric_configs.get(counter.name.as_str());
            let sample = Sample {
                labels: self.labels_for(config),
                value: counter.value,
            };
            self.register(&registry, &counter.name, config, &[sample])?;
        }

        self.encode_registry(&registry)
    }

    /// Renders per-processor snapshots with one sample per processor,
    /// distinguished by the `processor` label.
    ///
    /// # Errors
    ///
    /// Returns an error if metric creation, registration, or encoding fails.
    pub fn render_per_processor(&self, processors: &[ProcessorSnapshot]) -> Result<String> {
        let registry = Registry::new();

        let counters = processors.first().map(|p| p.counters.len()).unwrap_or(0);
        for index in 0..counters {
            let name = processors[0].counters[index].name.as_str();
            let config = self.metric_configs.get(name);

            let samples: Vec<Sample> = processors
                .iter()
                .map(|p| {
                    let mut labels = self.labels_for(config);
                    labels.push((PROCESSOR_LABEL.to_string(), p.processor.to_string()));
                    Sample {
                        labels,
                        value: p.counters.get(index).map(|c| c.value).unwrap_or(0),
                    }
                })
                .collect();

            if self.skip_zero && samples.iter().all(|s| s.value == 0) {
                continue;
            }
            self.register(&registry, name, config, &samples)?;
        }

        self.encode_registry(&registry)
    }

    /// Renders a snapshot to bytes (useful for HTTP responses).
    ///
    /// # Errors
    ///
    /// Returns an error if metric creation, registration, or encoding fails.
    pub fn render_bytes(&self, snapshot: &StatsSnapshot) -> Result<Vec<u8>> {
        Ok(self.render(snapshot)?.into_bytes())
    }

    fn register(
        &self,
        registry: &Registry,
        raw_name: &str,
        config: Option<&MetricConfig>,
        samples: &[Sample],
    ) -> Result<()> {
        let raw_name = if raw_name.is_empty() { "unnamed" } else { raw_name };
        let full_name = self.build_full_name(raw_name);
        let metric_type = config.map(|c| c.metric_type).unwrap_or(self.default_type);
        let help = config
            .and_then(|c| c.help.clone())
            .unwrap_or_else(|| format!("{} counter", raw_name));

        match metric_type {
            MetricType::Counter => Self::register_counter(registry, &full_name, &help, samples),
            MetricType::Gauge => Self::register_gauge(registry, &full_name, &help, samples),
        }
    }

    /// Encodes the registry to a string.
    fn encode_registry(&self, registry: &Registry) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PrometheusError::EncodeError(e.to_string()))?;
        Ok(String::from_utf8(buffer).map_err(PrometheusError::from)?)
    }

    /// Registers a counter metric with one value per sample.
    fn register_counter(
        registry: &Registry,
        name: &str,
        help: &str,
        samples: &[Sample],
    ) -> Result<()> {
        match samples {
            [only] if only.labels.is_empty() => {
                let counter = IntCounter::new(name, help)?;
                counter.inc_by(only.value);
                registry.register(Box::new(counter))?;
            }
            _ => {
                let label_names = label_names(samples);
                let counter = IntCounterVec::new(Opts::new(name, help), &label_names)?;
                for sample in samples {
                    let values = label_values(sample);
                    counter.with_label_values(&values).inc_by(sample.value);
                }
                registry.register(Box::new(counter))?;
            }
        }
        Ok(())
    }

    /// Registers a gauge metric with one value per sample.
    ///
    /// Values above `i64::MAX` saturate.
    fn register_gauge(
        registry: &Registry,
        name: &str,
        help: &str,
        samples: &[Sample],
    ) -> Result<()> {
        let to_i64 = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        match samples {
            [only] if only.labels.is_empty() => {
                let gauge = IntGauge::new(name, help)?;
                gauge.set(to_i64(only.value));
                registry.register(Box::new(gauge))?;
            }
            _ => {
                let label_names = label_names(samples);
                let gauge = IntGaugeVec::new(Opts::new(name, help), &label_names)?;
                for sample in samples {
                    let values = label_values(sample);
                    gauge.with_label_values(&values).set(to_i64(sample.value));
                }
                registry.register(Box::new(gauge))?;
            }
        }
        Ok(())
    }
}

fn label_names(samples: &[Sample]) -> Vec<&str> {
    samples
        .first()
        .map(|s| s.labels.iter().map(|(k, _)| k.as_str()).collect())
        .unwrap_or_default()
}

fn label_values(sample: &Sample) -> Vec<&str> {
    sample.labels.iter().map(|(_, v)| v.as_str()).collect()
}
