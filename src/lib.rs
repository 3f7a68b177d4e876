//! # Shardstat - Per-Thread, Per-Processor Named Counters
//!
//! A Rust library of named counters that many threads increment without
//! contention, and that can be summed at three granularities: the calling
//! thread, the calling thread's processor, or the whole process.
//!
//! ## The Problem
//!
//! A single atomic per counter is correct but every increment bounces the
//! counter's cache line between cores. Latency-sensitive code paths that
//! count events at high rates pay for that on every increment.
//!
//! ## The Solution: Per-Thread Blocks, Grouped by Processor
//!
//! Each thread that touches a counter gets its own **block**, a fixed array
//! with one slot per counter id. Only that thread ever writes the block, so an
//! increment is a relaxed load and store on memory no other core writes.
//!
//! Blocks are grouped into one **shard** per processor, chosen by the
//! processor the thread was running on when it created its block. Reads walk
//! the blocks of one shard (per-processor sum) or of every shard (global
//! sum), taking each shard's lock only while walking its list.
//!
//! ```text
//!                       ┌─────────────────────────────────────┐
//!   "requests" ──────►  │ Registry: name → dense id (0, 1, …) │
//!                       └─────────────────────────────────────┘
//!
//!   cpu 0 shard: [ T0 block ][ T3 block ]      sum_processor(id) on cpu 0
//!   cpu 1 shard: [ T1 block ]                  = T0[id] + T3[id]
//!   cpu 2 shard: [ T2 block ][ T4 block ]
//!                                              sum_global(id) = Σ all blocks
//!   T1 ──increment(id)──► T1 block[id] += 1    sum_thread(id) = own block[id]
//! ```
//!
//! ### Design Principles
//!
//! 1. **Single-writer blocks**: no atomic read-modify-write and no lock on the
//!    write path once a thread has its block.
//! 2. **Dense ids**: names are registered once into a fixed arena, and the id
//!    indexes every block directly.
//! 3. **Aggregation on read**: reads are more expensive than writes, which is
//!    the right trade-off for statistics.
//! 4. **Nothing is ever removed**: blocks of exited threads keep counting
//!    towards processor and global sums.
//!
//! ## Quick Start
//!
//! ```rust
//! use shardstat::{Stats, StatsConfig};
//!
//! let stats = Stats::new(StatsConfig::new().with_capacity(64)).unwrap();
//!
//! // Register once, cache the id, increment on the hot path.
//! let requests = stats.register_or_get("requests").unwrap();
//! stats.increment(requests);
//! stats.add(requests, 5);
//!
//! assert_eq!(stats.sum_thread(requests), 6);
//! assert_eq!(stats.sum_global(requests), 6);
//! assert_eq!(stats.sum_global_by_name("requests").unwrap(), 6);
//! ```
//!
//! ## Process-Wide Counters
//!
//! The macros work on a lazily created global context and cache each call
//! site's counter id, so only the first execution pays for the name lookup:
//!
//! ```rust
//! use shardstat::{stat_add, stat_inc, stat_sum, stat_sum_thread};
//!
//! for _ in 0..3 {
//!     stat_inc!(connections);
//! }
//! stat_add!(bytes_in, 1500);
//!
//! assert_eq!(stat_sum_thread!(connections), 3);
//! assert!(stat_sum!(bytes_in) >= 1500);
//! assert_eq!(stat_sum!(never_registered), 0);
//! ```
//!
//! ## Limits
//!
//! - At most `capacity` distinct counters (default 1024); registering one more
//!   fails with [`StatsError::CapacityExhausted`].
//! - Names are truncated to [`MAX_NAME_LEN`](registry::MAX_NAME_LEN) bytes;
//!   names sharing that prefix are the same counter.
//! - Each thread's block costs `capacity × 8` bytes.
//!
//! ## Observers
//!
//! Snapshots of all counters can be exported with optional observer modules,
//! each gated behind a feature flag:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Pretty-print counters as ASCII tables |
//! | `json` | [`observers::json`] | Serialize counters to JSON |
//! | `prometheus` | [`observers::prometheus`] | Export in Prometheus exposition format |
//! | `opentelemetry` | [`observers::opentelemetry`] | Export via OpenTelemetry observable counters |
//! | `full` | All observers | Enables all observer modules |
//!
//! ```rust,ignore
//! use shardstat::observers::table::TableObserver;
//! use shardstat::Granularity;
//!
//! let snapshot = shardstat::global().snapshot(Granularity::Global);
//! println!("{}", TableObserver::new().render(&snapshot));
//! ```

pub mod config;
pub mod error;
pub mod observers;
pub mod registry;
pub mod shard;
pub mod snapshot;
pub mod stats;
pub mod topology;

pub use config::StatsConfig;
pub use error::{Result, StatsError};
pub use registry::{CounterId, CounterName};
pub use stats::{global, init, Granularity, Stats};

#[doc(hidden)]
pub mod __private {
    //! Support code for the exported macros.

    use std::sync::OnceLock;

    use crate::registry::CounterId;
    use crate::stats::{global, Stats};

    pub use std::sync::OnceLock as IdCell;

    /// Resolves `name` against the global context, registering it on first
    /// use and caching the id in `cell`.
    ///
    /// # Panics
    ///
    /// Panics if the global context has no room left for a new counter.
    #[inline]
    pub fn register_cached(cell: &OnceLock<CounterId>, name: &str) -> (&'static Stats, CounterId) {
        let stats = global();
        let id = *cell.get_or_init(|| match stats.register_or_get(name) {
            Ok(id) => id,
            Err(e) => panic!("cannot register counter {name:?}: {e}"),
        });
        (stats, id)
    }

    /// Converts a macro amount to `u64`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is negative or does not fit in a `u64`.
    #[inline]
    pub fn amount<N>(n: N) -> u64
    where
        N: TryInto<u64> + Copy + std::fmt::Display,
    {
        match n.try_into() {
            Ok(n) => n,
            Err(_) => panic!("counter amount {n} is not a valid u64"),
        }
    }

    /// Resolves `name` against the global context without registering it,
    /// caching the id in `cell` once it exists.
    #[inline]
    pub fn lookup_cached(
        cell: &OnceLock<CounterId>,
        name: &str,
    ) -> (&'static Stats, Option<CounterId>) {
        let stats = global();
        if let Some(id) = cell.get() {
            return (stats, Some(*id));
        }
        let id = stats.lookup(name).map(|id| *cell.get_or_init(|| id));
        (stats, id)
    }
}

/// Adds one to a process-wide counter.
///
/// The counter name is either an identifier (`stat_inc!(requests)`) or a
/// string literal (`stat_inc!("http.requests")`). The id is cached per call
/// site.
///
/// # Panics
///
/// Panics if the counter is new and the global context is full.
#[macro_export]
macro_rules! stat_inc {
    ($name:ident) => {
        $crate::stat_add!(::core::stringify!($name), 1)
    };
    ($name:literal) => {
        $crate::stat_add!($name, 1)
    };
}

/// Adds `n` to a process-wide counter.
///
/// `n` may be any integer type. It is converted with `TryInto<u64>`.
///
/// # Panics
///
/// Panics if the counter is new and the global context is full, or if `n` is
/// negative or larger than `u64::MAX`.
#[macro_export]
macro_rules! stat_add {
    ($name:ident, $n:expr) => {
        $crate::stat_add!(::core::stringify!($name), $n)
    };
    ($name:expr, $n:expr) => {{
        static ID: $crate::__private::IdCell<$crate::CounterId> = $crate::__private::IdCell::new();
        let (stats, id) = $crate::__private::register_cached(&ID, $name);
        stats.add(id, $crate::__private::amount($n));
    }};
}

/// Sum of a process-wide counter over all threads, or 0 if it was never
/// registered.
#[macro_export]
macro_rules! stat_sum {
    (@ $name:expr, $granularity:ident) => {{
        static ID: $crate::__private::IdCell<$crate::CounterId> = $crate::__private::IdCell::new();
        match $crate::__private::lookup_cached(&ID, $name) {
            (stats, ::core::option::Option::Some(id)) => {
                stats.sum(id, $crate::Granularity::$granularity)
            }
            (_, ::core::option::Option::None) => 0u64,
        }
    }};
    ($name:ident) => {
        $crate::stat_sum!(@ ::core::stringify!($name), Global)
    };
    ($name:literal) => {
        $crate::stat_sum!(@ $name, Global)
    };
}

/// Sum of a process-wide counter over the threads of the current processor,
/// or 0 if it was never registered.
#[macro_export]
macro_rules! stat_sum_processor {
    ($name:ident) => {
        $crate::stat_sum!(@ ::core::stringify!($name), Processor)
    };
    ($name:literal) => {
        $crate::stat_sum!(@ $name, Processor)
    };
}

/// The calling thread's count of a process-wide counter, or 0 if it was never
/// registered.
#[macro_export]
macro_rules! stat_sum_thread {
    ($name:ident) => {
        $crate::stat_sum!(@ ::core::stringify!($name), Thread)
    };
    ($name:literal) => {
        $crate::stat_sum!(@ $name, Thread)
    };
}
