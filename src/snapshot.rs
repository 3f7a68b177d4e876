//! Point-in-time captures of every registered counter.
//!
//! Snapshots are what the observers render. They are plain data, detached
//! from the context, and serializable when the `serde` feature is enabled.
//!
//! # Examples
//!
//! ```rust
//! use shardstat::{Granularity, Stats, StatsConfig};
//!
//! let stats = Stats::new(StatsConfig::new().with_capacity(8)).unwrap();
//! let req = stats.register_or_get("requests").unwrap();
//! stats.add(req, 42);
//!
//! let snapshot = stats.snapshot(Granularity::Global);
//! assert_eq!(snapshot.get("requests").unwrap().value, 42);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::stats::Granularity;

/// The value of a single counter at the time of the capture.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CounterSnapshot {
    /// Dense id of the counter.
    pub id: usize,
    /// Stored name of the counter.
    pub name: String,
    /// Sum at the snapshot's granularity.
    pub value: u64,
}

impl CounterSnapshot {
    /// Creates a counter snapshot.
    pub fn new(id: usize, name: impl Into<String>, value: u64) -> Self {
        Self {
            id,
            name: name.into(),
            value,
        }
    }
}

/// Every registered counter, summed at one granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatsSnapshot {
    /// Scope the values were summed over.
    pub granularity: Granularity,
    /// Processor whose shard was summed, for [`Granularity::Processor`].
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub processor: Option<usize>,
    /// Optional timestamp in milliseconds since Unix epoch.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub timestamp_ms: Option<u64>,
    /// One entry per registered counter, in id order.
    pub counters: Vec<CounterSnapshot>,
}

impl StatsSnapshot {
    /// Creates a snapshot without processor or timestamp.
    pub fn new(granularity: Granularity, counters: Vec<CounterSnapshot>) -> Self {
        Self {
            granularity,
            processor: None,
            timestamp_ms: None,
            counters,
        }
    }

    /// Sets the timestamp, returning `self` for chaining.
    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Finds a counter by name.
    pub fn get(&self, name: &str) -> Option<&CounterSnapshot> {
        self.counters.iter().find(|c| c.name == name)
    }

    /// Sum of all counter values.
    pub fn total(&self) -> u64 {
        self.counters
            .iter()
            .fold(0u64, |acc, c| acc.wrapping_add(c.value))
    }

    /// Iterates over counters with a non-zero value.
    pub fn non_zero(&self) -> impl Iterator<Item = &CounterSnapshot> + '_ {
        self.counters.iter().filter(|c| c.value != 0)
    }

    /// Number of counters in the snapshot.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Returns `true` if no counter was registered at capture time.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// The counters of one processor shard.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessorSnapshot {
    /// Processor index.
    pub processor: usize,
    /// Number of thread blocks in the shard.
    pub threads: usize,
    /// One entry per registered counter, in id order.
    pub counters: Vec<CounterSnapshot>,
}

/// Returns the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
