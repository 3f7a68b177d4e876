//! Error type for counter registration, lookup and configuration.

use thiserror::Error;

/// Errors reported by the counter engine.
///
/// Out-of-range counter ids are not represented here: an id that was not
/// handed out by the context it is used with is a caller bug and panics.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Every slot of the registry is taken; the name was not registered.
    #[error("counter capacity exhausted ({capacity} counters registered)")]
    CapacityExhausted {
        /// Configured maximum number of distinct counters.
        capacity: usize,
    },

    /// The name was never registered with this context.
    #[error("unknown counter: {0}")]
    UnknownCounter(String),

    /// The configuration cannot be used to build a context.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A processor index outside the shard table was requested.
    #[error("processor {processor} out of range (processor count is {count})")]
    ProcessorOutOfRange {
        /// Requested processor index.
        processor: usize,
        /// Number of shards in the context.
        count: usize,
    },

    /// Setting the calling thread's processor affinity failed.
    #[error("cannot set thread affinity: {0}")]
    Affinity(#[source] std::io::Error),
}

/// Result type for counter engine operations.
pub type Result<T> = std::result::Result<T, StatsError>;
