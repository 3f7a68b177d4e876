//! JSON observer for serializing counter snapshots.
//!
//! This module provides [`JsonObserver`], which serializes a
//! [`StatsSnapshot`] (or per-processor [`ProcessorSnapshot`]s) to JSON using
//! serde.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! shardstat = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use shardstat::observers::json::JsonObserver;
//! use shardstat::{Granularity, Stats, StatsConfig};
//!
//! let stats = Stats::new(StatsConfig::new()).unwrap();
//! let requests = stats.register_or_get("http_requests").unwrap();
//! stats.add(requests, 1000);
//!
//! let json = JsonObserver::new().to_json(&stats.snapshot(Granularity::Global)).unwrap();
//! println!("{}", json);
//! // [{"id":0,"name":"http_requests","value":1000}]
//! ```

use crate::observers::Result;
use crate::snapshot::{current_timestamp_ms, CounterSnapshot, ProcessorSnapshot, StatsSnapshot};
use serde::Serialize;

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to include a timestamp in the output.
    pub include_timestamp: bool,
    /// Whether to emit the whole snapshot object instead of the bare
    /// counter array.
    pub wrap_in_snapshot: bool,
}

/// An observer that serializes counter snapshots to JSON format.
///
/// By default only the counter array is emitted. With
/// [`wrap_in_snapshot`](Self::wrap_in_snapshot) the granularity, processor and
/// (optionally) a timestamp are emitted alongside it:
///
/// ```text
/// {"granularity":"global","timestamp_ms":1700000000000,"counters":[...]}
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables timestamp inclusion.
    ///
    /// Only has effect when `wrap_in_snapshot` is also enabled. A timestamp
    /// already present on the snapshot is kept.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Enables or disables wrapping the output in the snapshot object.
    pub fn wrap_in_snapshot(mut self, enabled: bool) -> Self {
        self.config.wrap_in_snapshot = enabled;
        self
    }

    /// Returns the counters that would be serialized, with unnamed counters
    /// labelled `(unnamed)`.
    pub fn collect(&self, snapshot: &StatsSnapshot) -> Vec<CounterSnapshot> {
        snapshot
            .counters
            .iter()
            .map(|c| {
                if c.name.is_empty() {
                    CounterSnapshot::new(c.id, "(unnamed)", c.value)
                } else {
                    c.clone()
                }
            })
            .collect()
    }

    fn prepare(&self, snapshot: &StatsSnapshot) -> StatsSnapshot {
        let mut prepared = StatsSnapshot {
            counters: self.collect(snapshot),
            ..snapshot.clone()
        };
        if self.config.include_timestamp && prepared.timestamp_ms.is_none() {
            prepared.timestamp_ms = Some(current_timestamp_ms());
        }
        prepared
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }

    /// Serializes a snapshot to a JSON string.
    pub fn to_json(&self, snapshot: &StatsSnapshot) -> Result<String> {
        if self.config.wrap_in_snapshot {
            self.encode(&self.prepare(snapshot))
        } else {
            self.encode(&self.collect(snapshot))
        }
    }

    /// Serializes a snapshot to a JSON byte vector.
    ///
    /// Pretty-printing does not apply.
    pub fn to_json_bytes(&self, snapshot: &StatsSnapshot) -> Result<Vec<u8>> {
        let bytes = if self.config.wrap_in_snapshot {
            serde_json::to_vec(&self.prepare(snapshot))?
        } else {
            serde_json::to_vec(&self.collect(snapshot))?
        };
        Ok(bytes)
    }

    /// Serializes per-processor snapshots to a JSON array with one object per
    /// processor.
    pub fn processors_to_json(&self, processors: &[ProcessorSnapshot]) -> Result<String> {
        self.encode(processors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{Granularity, Stats};
    use crate::StatsConfig;

    fn snapshot(values: &[(&str, u64)]) -> StatsSnapshot {
        StatsSnapshot::new(
            Granularity::Global,
            values
                .iter()
                .enumerate()
                .map(|(id, (name, value))| CounterSnapshot::new(id, *name, *value))
                .collect(),
        )
    }

    #[test]
    fn test_to_json_empty() {
        let json = JsonObserver::new().to_json(&snapshot(&[])).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_to_json_single_counter() {
        let json = JsonObserver::new()
            .to_json(&snapshot(&[("test_counter", 42)]))
            .unwrap();
        assert_eq!(json, r#"[{"id":0,"name":"test_counter","value":42}]"#);
    }

    #[test]
    fn test_to_json_from_context() {
        let stats = Stats::new(StatsConfig::new().with_capacity(8)).unwrap();
        let requests = stats.register_or_get("requests").unwrap();
        let errors = stats.register_or_get("errors").unwrap();
        stats.add(requests, 1000);
        stats.add(errors, 5);

        let json = JsonObserver::new()
            .to_json(&stats.snapshot(Granularity::Global))
            .unwrap();
        assert!(json.contains(r#""name":"requests","value":1000"#));
        assert!(json.contains(r#""name":"errors","value":5"#));
    }

    #[test]
    fn test_to_json_pretty() {
        let json = JsonObserver::new()
            .pretty(true)
            .to_json(&snapshot(&[("test", 1)]))
            .unwrap();
        // Pretty JSON contains newlines
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_to_json_with_snapshot() {
        let json = JsonObserver::new()
            .wrap_in_snapshot(true)
            .to_json(&snapshot(&[("metric", 100)]))
            .unwrap();
        assert!(json.starts_with(r#"{"granularity":"global","counters":["#));
        assert!(!json.contains("timestamp_ms"));
    }

    #[test]
    fn test_to_json_with_timestamp() {
        let json = JsonObserver::new()
            .wrap_in_snapshot(true)
            .include_timestamp(true)
            .to_json(&snapshot(&[("metric", 50)]))
            .unwrap();
        assert!(json.contains("timestamp_ms"));
        assert!(json.contains("counters"));
    }

    #[test]
    fn test_existing_timestamp_kept() {
        let snap = snapshot(&[("metric", 1)]).with_timestamp(77);
        let json = JsonObserver::new()
            .wrap_in_snapshot(true)
            .include_timestamp(true)
            .to_json(&snap)
            .unwrap();
        assert!(json.contains(r#""timestamp_ms":77"#));
    }

    #[test]
    fn test_timestamp_ignored_without_wrap() {
        let json = JsonObserver::new()
            .include_timestamp(true)
            .to_json(&snapshot(&[("metric", 1)]))
            .unwrap();
        assert!(json.starts_with('['));
        assert!(!json.contains("timestamp_ms"));
    }

    #[test]
    fn test_unnamed_counter() {
        let json = JsonObserver::new().to_json(&snapshot(&[("", 99)])).unwrap();
        assert!(json.contains("(unnamed)"));
    }

    #[test]
    fn test_wrapped_round_trip() {
        let expected = snapshot(&[("a", 1), ("b", 2)]);
        let json = JsonObserver::new()
            .wrap_in_snapshot(true)
            .to_json(&expected)
            .unwrap();
        let parsed: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_to_json_bytes() {
        let bytes = JsonObserver::new()
            .to_json_bytes(&snapshot(&[("bytes_test", 123)]))
            .unwrap();
        let json = String::from_utf8(bytes).unwrap();
        assert!(json.contains("bytes_test"));
        assert!(json.contains("123"));
    }

    #[test]
    fn test_processors_to_json() {
        let stats = Stats::new(
            StatsConfig::new()
                .with_capacity(4)
                .with_topology(crate::topology::FixedTopology::new(2)),
        )
        .unwrap();
        let req = stats.register_or_get("req").unwrap();
        stats.add(req, 3);

        let json = JsonObserver::new()
            .processors_to_json(&stats.processor_snapshot())
            .unwrap();
        assert!(json.contains(r#""processor":0"#));
        assert!(json.contains(r#""processor":1"#));
        assert!(json.contains(r#""name":"req""#));
    }
}
