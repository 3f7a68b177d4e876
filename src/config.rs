//! Configuration for a counter context.
//!
//! A [`StatsConfig`] fixes everything that cannot change once a context exists:
//! how many distinct counters can be registered, how wide the name hash table
//! is, how many processor shards there are, and where processor information
//! comes from.
//!
//! # Examples
//!
//! ```rust
//! use shardstat::config::StatsConfig;
//! use shardstat::topology::FixedTopology;
//!
//! let config = StatsConfig::new()
//!     .with_capacity(64)
//!     .with_table_size(31)
//!     .with_topology(FixedTopology::new(2));
//!
//! assert_eq!(config.capacity, 64);
//! assert_eq!(config.processor_count(), 2);
//! ```

use std::sync::Arc;

use crate::error::{Result, StatsError};
use crate::topology::{SystemTopology, Topology};

/// Default maximum number of distinct counters.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default number of buckets in the name hash table.
pub const DEFAULT_TABLE_SIZE: usize = 1024;

/// Environment variable overriding [`StatsConfig::capacity`].
pub const ENV_CAPACITY: &str = "SHARDSTAT_CAPACITY";

/// Environment variable overriding [`StatsConfig::table_size`].
pub const ENV_TABLE_SIZE: &str = "SHARDSTAT_TABLE_SIZE";

/// Environment variable overriding [`StatsConfig::processors`].
pub const ENV_PROCESSORS: &str = "SHARDSTAT_PROCESSORS";

/// Configuration for a [`Stats`](crate::stats::Stats) context.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Maximum number of distinct counters. Also the length of every
    /// thread's counter block.
    pub capacity: usize,
    /// Number of buckets in the name hash table.
    pub table_size: usize,
    /// Number of processor shards. `None` asks the topology.
    pub processors: Option<usize>,
    /// Source of the current processor for block placement.
    pub topology: Arc<dyn Topology>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            table_size: DEFAULT_TABLE_SIZE,
            processors: None,
            topology: Arc::new(SystemTopology),
        }
    }
}

impl StatsConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from the defaults overridden by
    /// `SHARDSTAT_CAPACITY`, `SHARDSTAT_TABLE_SIZE` and `SHARDSTAT_PROCESSORS`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidConfig`] if a variable is set but is not a
    /// non-negative integer.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(capacity) = env_usize(ENV_CAPACITY)? {
            config.capacity = capacity;
        }
        if let Some(table_size) = env_usize(ENV_TABLE_SIZE)? {
            config.table_size = table_size;
        }
        if let Some(processors) = env_usize(ENV_PROCESSORS)? {
            config.processors = Some(processors);
        }
        Ok(config)
    }

    /// Sets the maximum number of distinct counters.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the number of buckets in the name hash table.
    pub fn with_table_size(mut self, table_size: usize) -> Self {
        self.table_size = table_size;
        self
    }

    /// Sets the number of processor shards explicitly.
    pub fn with_processors(mut self, processors: usize) -> Self {
        self.processors = Some(processors);
        self
    }

    /// Sets the topology used for processor count and block placement.
    pub fn with_topology(mut self, topology: impl Topology + 'static) -> Self {
        self.topology = Arc::new(topology);
        self
    }

    /// Number of shards a context built from this configuration will have.
    pub fn processor_count(&self) -> usize {
        self.processors
            .unwrap_or_else(|| self.topology.processor_count())
    }

    /// Checks that a context can be built from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidConfig`] if capacity, table size or
    /// processor count is zero, or if capacity does not fit a `u32` id.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(StatsError::InvalidConfig("capacity must be non-zero".into()));
        }
        if self.capacity > u32::MAX as usize {
            return Err(StatsError::InvalidConfig(format!(
                "capacity {} exceeds {}",
                self.capacity,
                u32::MAX
            )));
        }
        if self.table_size == 0 {
            return Err(StatsError::InvalidConfig(
                "table size must be non-zero".into(),
            ));
        }
        if self.processor_count() == 0 {
            return Err(StatsError::InvalidConfig(
                "processor count must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Returns `true` if both configurations build identically sized contexts.
    pub(crate) fn same_shape(&self, other: &StatsConfig) -> bool {
        self.capacity == other.capacity
            && self.table_size == other.table_size
            && self.processor_count() == other.processor_count()
    }
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| StatsError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(StatsError::InvalidConfig(format!("{key}: {e}"))),
    }
}
