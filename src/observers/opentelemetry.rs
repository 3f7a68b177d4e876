//! OpenTelemetry observer for exporting counters via OTLP.
//!
//! This module provides [`OtelObserver`], which registers a [`Stats`] context
//! with OpenTelemetry's MeterProvider using observable instruments
//! (callbacks).
//!
//! # Feature Flag
//!
//! This module requires the `opentelemetry` feature:
//!
//! ```toml
//! [dependencies]
//! shardstat = { version = "0.1", features = ["opentelemetry"] }
//! ```
//!
//! # How It Works
//!
//! The counters of a context are exported through one observable counter.
//! Every registered counter becomes a data point distinguished by the
//! `counter` attribute, and counters registered after the observer are picked
//! up on the next collection. Single counters can also get an instrument of
//! their own.
//!
//! # Example
//!
//! ```rust,ignore
//! use shardstat::observers::opentelemetry::OtelObserver;
//! use shardstat::stat_inc;
//!
//! fn main() -> shardstat::observers::Result<()> {
//!     // Setup OpenTelemetry MeterProvider first
//!
//!     let observer = OtelObserver::new("myapp");
//!     observer.register(shardstat::global())?;
//!
//!     // Counters are now exported by the MeterProvider
//!     stat_inc!(requests);
//!
//!     Ok(())
//! }
//! ```

use opentelemetry::{global, metrics::Meter, KeyValue};

use super::{OtelError, Result};
use crate::stats::{Granularity, Stats};

/// Default name of the instrument that carries every counter.
pub const DEFAULT_INSTRUMENT: &str = "shardstat.counters";

/// Attribute naming the counter of a data point.
pub const COUNTER_ATTRIBUTE: &str = "counter";

/// Attribute naming the processor of a data point.
pub const PROCESSOR_ATTRIBUTE: &str = "processor";

/// Observer that exports a counter context to OpenTelemetry using observable
/// instruments.
///
/// # Static Context
///
/// The context must be `'static` (typically [`global()`](crate::global)) because
/// OpenTelemetry callbacks hold references for the lifetime of the program.
///
/// # Example
///
/// ```rust,ignore
/// use shardstat::observers::opentelemetry::OtelObserver;
///
/// let observer = OtelObserver::new("myapp")
///     .with_instrument_name("myapp.events")
///     .with_description_prefix("My Application");
///
/// observer.register(shardstat::global())?;
/// observer.register_counter(shardstat::global(), "requests")?;
/// ```
pub struct OtelObserver {
    meter: Meter,
    instrument_name: String,
    description_prefix: Option<String>,
}

impl OtelObserver {
    /// Creates a new OpenTelemetry observer with the given meter name.
    ///
    /// The meter is created from the global MeterProvider.
    pub fn new(meter_name: &'static str) -> Self {
        Self::with_meter(global::meter(meter_name))
    }

    /// Creates an observer with a specific meter instance.
    ///
    /// Use this when you want a meter from a specific MeterProvider.
    pub fn with_meter(meter: Meter) -> Self {
        Self {
            meter,
            instrument_name: DEFAULT_INSTRUMENT.to_string(),
            description_prefix: None,
        }
    }

    /// Sets the name of the instrument created by [`register`](Self::register)
    /// and [`register_per_processor`](Self::register_per_processor).
    pub fn with_instrument_name(mut self, name: impl Into<String>) -> Self {
        self.instrument_name = name.into();
        self
    }

    /// Sets a description prefix for all registered instruments.
    ///
    /// Instrument "requests" gets the description "My Application: requests".
    pub fn with_description_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.description_prefix = Some(prefix.into());
        self
    }

    /// Builds the description string for an instrument.
    fn build_description(&self, name: &str) -> String {
        match &self.description_prefix {
            Some(prefix) => format!("{}: {}", prefix, name),
            None => format!("{} counter", name),
        }
    }

    fn instrument_name(&self) -> Result<String> {
        if self.instrument_name.is_empty() {
            return Err(OtelError::MetricError("instrument must have a name".into()).into());
        }
        Ok(self.instrument_name.clone())
    }

    /// Registers every counter of `stats` under one observable counter.
    ///
    /// Each collection reports the global sum of every registered counter,
    /// with a `counter` attribute holding its name.
    pub fn register(&self, stats: &'static Stats) -> Result<()> {
        let name = self.instrument_name()?;
        let description = self.build_description(&name);

        let _ = self
            .meter
            .u64_observable_counter(name)
            .with_description(description)
            .with_callback(move |observer| {
                for counter in stats.snapshot(Granularity::Global).counters {
                    observer.observe(counter.value, &[KeyValue::new(COUNTER_ATTRIBUTE, counter.name)]);
                }
            })
            .build();

        Ok(())
    }

    /// Registers every counter of `stats` with one data point per processor,
    /// carrying both a `counter` and a `processor` attribute.
    pub fn register_per_processor(&self, stats: &'static Stats) -> Result<()> {
        let name = self.instrument_name()?;
        let description = self.build_description(&name);

        let _ = self
            .meter
            .u64_observable_counter(name)
            .with_description(description)
            .with_callback(move |observer| {
                for shard in stats.processor_snapshot() {
                    for counter in shard.counters {
                        observer.observe(
                            counter.value,
                            &processor_attributes(counter.name, shard.processor),
                        );
                    }
                }
            })
            .build();

        Ok(())
    }

    /// Registers a single counter as its own observable counter, named after
    /// the counter.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownCounter`](crate::StatsError::UnknownCounter)
    /// if `name` was never registered in `stats`.
    pub fn register_counter(&self, stats: &'static Stats, name: &str) -> Result<()> {
        let id = stats.resolve(name)?;
        let stored = stats
            .name_of(id)
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| name.to_string());
        let description = self.build_description(&stored);

        let _ = self
            .meter
            .u64_observable_counter(stored)
            .with_description(description)
            .with_callback(move |observer| {
                observer.observe(stats.sum_global(id), &[]);
            })
            .build();

        Ok(())
    }
}

fn processor_attributes(counter: String, processor: usize) -> [KeyValue; 2] {
    [
        KeyValue::new(COUNTER_ATTRIBUTE, counter),
        KeyValue::new(PROCESSOR_ATTRIBUTE, processor as i64),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::data::{ResourceMetrics, Sum};
    use opentelemetry_sdk::metrics::reader::MetricReader;
    use opentelemetry_sdk::metrics::{
        InstrumentKind, ManualReader, MetricResult, Pipeline, SdkMeterProvider, Temporality,
    };
    use opentelemetry_sdk::Resource;

    use super::*;
    use crate::error::StatsError;
    use crate::observers::ObserverError;
    use crate::topology::FixedTopology;
    use crate::StatsConfig;

    fn leaked_stats() -> &'static Stats {
        Box::leak(Box::new(
            Stats::new(StatsConfig::new().with_capacity(8)).unwrap(),
        ))
    }

    /// A `ManualReader` the test keeps a handle to after giving it to the
    /// provider.
    #[derive(Debug, Clone)]
    struct SharedReader(Arc<ManualReader>);

    impl MetricReader for SharedReader {
        fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
            self.0.register_pipeline(pipeline)
        }

        fn collect(&self, rm: &mut ResourceMetrics) -> MetricResult<()> {
            self.0.collect(rm)
        }

        fn force_flush(&self) -> MetricResult<()> {
            self.0.force_flush()
        }

        fn shutdown(&self) -> MetricResult<()> {
            self.0.shutdown()
        }

        fn temporality(&self, kind: InstrumentKind) -> Temporality {
            self.0.temporality(kind)
        }
    }

    fn observer_with_reader() -> (OtelObserver, SharedReader, SdkMeterProvider) {
        let reader = SharedReader(Arc::new(ManualReader::builder().build()));
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let observer = OtelObserver::with_meter(provider.meter("shardstat-test"));
        (observer, reader, provider)
    }

    type Point = (Vec<(String, String)>, u64);

    /// Collects once and returns the data points of `instrument`, with their
    /// attributes sorted by key.
    fn collect_points(reader: &SharedReader, instrument: &str) -> Vec<Point> {
        let mut rm = ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: vec![],
        };
        reader.collect(&mut rm).unwrap();

        let mut points = Vec::new();
        for scope in &rm.scope_metrics {
            for metric in scope.metrics.iter().filter(|m| m.name == instrument) {
                let sum = metric
                    .data
                    .as_any()
                    .downcast_ref::<Sum<u64>>()
                    .expect("observable counter reports a u64 sum");
                for dp in &sum.data_points {
                    let mut attrs: Vec<(String, String)> = dp
                        .attributes
                        .iter()
                        .map(|kv| (kv.key.as_str().to_string(), kv.value.to_string()))
                        .collect();
                    attrs.sort();
                    points.push((attrs, dp.value));
                }
            }
        }
        points.sort();
        points
    }

    fn counter_point(name: &str, value: u64) -> Point {
        (vec![(COUNTER_ATTRIBUTE.to_string(), name.to_string())], value)
    }

    #[test]
    fn test_otel_observer_new() {
        let observer = OtelObserver::new("test");
        assert!(observer.description_prefix.is_none());
        assert_eq!(observer.instrument_name, DEFAULT_INSTRUMENT);
    }

    #[test]
    fn test_build_description_with_prefix() {
        let observer = OtelObserver::new("test").with_description_prefix("My App");
        assert_eq!(observer.build_description("requests"), "My App: requests");
    }

    #[test]
    fn test_build_description_without_prefix() {
        let observer = OtelObserver::new("test");
        assert_eq!(observer.build_description("requests"), "requests counter");
    }

    #[test]
    fn test_processor_attributes() {
        let attrs = processor_attributes("req".to_string(), 3);
        assert_eq!(attrs[0].key.as_str(), COUNTER_ATTRIBUTE);
        assert_eq!(attrs[1].key.as_str(), PROCESSOR_ATTRIBUTE);
    }

    #[test]
    fn test_register_context() {
        let stats = leaked_stats();
        let id = stats.register_or_get("requests").unwrap();
        stats.increment(id);

        let observer = OtelObserver::new("test");
        assert!(observer.register(stats).is_ok());
        assert!(observer.register_per_processor(stats).is_ok());
    }

    #[test]
    fn test_register_reports_global_sums() {
        let stats = leaked_stats();
        let requests = stats.register_or_get("requests").unwrap();
        let errors = stats.register_or_get("errors").unwrap();
        stats.add(requests, 40);
        std::thread::spawn(move || {
            stats.add(requests, 2);
            stats.increment(errors);
        })
        .join()
        .unwrap();

        let (observer, reader, _provider) = observer_with_reader();
        observer.register(stats).unwrap();

        assert_eq!(
            collect_points(&reader, DEFAULT_INSTRUMENT),
            vec![counter_point("errors", 1), counter_point("requests", 42)]
        );

        // Counters registered later show up on the next collection.
        let late = stats.register_or_get("late").unwrap();
        stats.add(late, 5);
        assert_eq!(
            collect_points(&reader, DEFAULT_INSTRUMENT),
            vec![
                counter_point("errors", 1),
                counter_point("late", 5),
                counter_point("requests", 42),
            ]
        );
    }

    #[test]
    fn test_register_per_processor_reports_each_shard() {
        let stats: &'static Stats = Box::leak(Box::new(
            Stats::new(
                StatsConfig::new()
                    .with_capacity(4)
                    .with_topology(FixedTopology::new(2)),
            )
            .unwrap(),
        ));
        let hits = stats.register_or_get("hits").unwrap();
        for (processor, n) in [(0, 3), (1, 7)] {
            std::thread::spawn(move || {
                FixedTopology::set_current(processor);
                stats.add(hits, n);
            })
            .join()
            .unwrap();
        }

        let (observer, reader, _provider) = observer_with_reader();
        observer
            .with_instrument_name("shardstat.per_processor")
            .register_per_processor(stats)
            .unwrap();

        let point = |processor: &str, value| {
            (
                vec![
                    (COUNTER_ATTRIBUTE.to_string(), "hits".to_string()),
                    (PROCESSOR_ATTRIBUTE.to_string(), processor.to_string()),
                ],
                value,
            )
        };
        assert_eq!(
            collect_points(&reader, "shardstat.per_processor"),
            vec![point("0", 3), point("1", 7)]
        );
    }

    #[test]
    fn test_register_counter_reports_its_sum() {
        let stats = leaked_stats();
        let errors = stats.register_or_get("errors").unwrap();
        stats.add(errors, 9);

        let (observer, reader, _provider) = observer_with_reader();
        observer.register_counter(stats, "errors").unwrap();

        assert_eq!(collect_points(&reader, "errors"), vec![(vec![], 9)]);
        stats.increment(errors);
        assert_eq!(collect_points(&reader, "errors"), vec![(vec![], 10)]);
    }

    #[test]
    fn test_register_empty_instrument_name_fails() {
        let observer = OtelObserver::new("test").with_instrument_name("");
        assert!(observer.register(leaked_stats()).is_err());
    }

    #[test]
    fn test_register_counter() {
        let stats = leaked_stats();
        stats.register_or_get("errors").unwrap();

        let observer = OtelObserver::new("test");
        assert!(observer.register_counter(stats, "errors").is_ok());

        let missing = observer.register_counter(stats, "missing");
        assert!(matches!(
            missing,
            Err(ObserverError::Stats(StatsError::UnknownCounter(_)))
        ));
    }
}
