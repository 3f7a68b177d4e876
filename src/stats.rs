//! The counter context: registry, shard table and aggregation.
//!
//! A [`Stats`] ties together the [`Registry`] that names counters, the
//! [`ShardTable`] that holds every thread's [`CounterBlock`], and the
//! read-side queries that sum a counter over one thread, one processor or the
//! whole process.
//!
//! # Write path
//!
//! ```text
//!   add(id, n)
//!     │
//!     ├─ thread-local cache hit? ──yes──► block.counts[id] += n   (no lock)
//!     │
//!     └─ no: allocate zeroed block
//!            p = topology.current_processor()
//!            lock shards[p]; push block; unlock
//!            remember block in thread-local cache
//!            block.counts[id] += n
//! ```
//!
//! # Read path
//!
//! | Granularity | Cost |
//! |-------------|------|
//! | [`Granularity::Thread`] | one relaxed load from the caller's block |
//! | [`Granularity::Processor`] | lock one shard, walk its blocks |
//! | [`Granularity::Global`] | lock each shard in turn, walk all blocks |
//!
//! Sums are not atomic snapshots: each block is read at some point after the
//! shard lock was taken, while other threads keep writing.
//!
//! # Process-wide context
//!
//! [`init`] and [`global`] give access to a single lazily created context.
//! Code that wants isolation (tests, embedders with several independent
//! counter sets) builds its own with [`Stats::new`].

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StatsConfig;
use crate::error::{Result, StatsError};
use crate::registry::{CounterId, CounterName, Registry};
use crate::shard::{CounterBlock, ShardTable};
use crate::snapshot::{CounterSnapshot, ProcessorSnapshot, StatsSnapshot};

/// Scope of a sum query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Granularity {
    /// The calling thread's own block.
    Thread,
    /// Blocks created on the calling thread's current processor.
    Processor,
    /// Every block in the process.
    Global,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Granularity::Thread => "thread",
            Granularity::Processor => "processor",
            Granularity::Global => "global",
        })
    }
}

/// Source of instance ids that key the thread-local block cache.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Blocks owned by the current thread, one per live context it has
    /// touched.
    ///
    /// The shard table of a context holds the only strong reference to its
    /// blocks, so dropping the context frees them. Entries of dropped
    /// contexts are purged whenever a new block is cached.
    static THREAD_BLOCKS: RefCell<Vec<(u64, Weak<CounterBlock>)>> =
        const { RefCell::new(Vec::new()) };
}

/// A set of named counters, sharded per thread and per processor.
///
/// # Examples
///
/// ```rust
/// use shardstat::{Stats, StatsConfig};
/// use std::sync::Arc;
/// use std::thread;
///
/// let stats = Arc::new(Stats::new(StatsConfig::new().with_capacity(16)).unwrap());
/// let req = stats.register_or_get("requests").unwrap();
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let stats = Arc::clone(&stats);
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 stats.increment(req);
///             }
///             stats.sum_thread(req)
///         })
///     })
///     .collect();
///
/// for h in handles {
///     assert_eq!(h.join().unwrap(), 1000);
/// }
/// assert_eq!(stats.sum_global(req), 4000);
/// assert_eq!(stats.sum_thread(req), 0);
/// ```
pub struct Stats {
    instance: u64,
    config: StatsConfig,
    registry: Registry,
    shards: ShardTable,
}

impl Stats {
    /// Creates a context from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(config: StatsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StatsConfig) -> Self {
        let processors = config.processor_count();
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        debug!(
            instance,
            capacity = config.capacity,
            table_size = config.table_size,
            processors,
            "creating counter context"
        );
        Self {
            instance,
            registry: Registry::new(config.capacity, config.table_size),
            shards: ShardTable::new(processors),
            config,
        }
    }

    /// The configuration this context was built from.
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// The name registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Maximum number of distinct counters.
    pub fn capacity(&self) -> usize {
        self.registry.capacity()
    }

    /// Number of processor shards.
    pub fn processor_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of registered counters.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if no counter has been registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of thread blocks created so far, including those of threads
    /// that have exited.
    pub fn thread_count(&self) -> usize {
        self.shards.block_count()
    }

    /// The calling thread's current processor, as a shard index.
    pub fn current_processor(&self) -> usize {
        self.config.topology.current_processor() % self.shards.len()
    }

    // ---------------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------------

    /// Returns the id of `name`, registering it if needed.
    ///
    /// Names longer than [`MAX_NAME_LEN`](crate::registry::MAX_NAME_LEN)
    /// bytes are truncated first.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::CapacityExhausted`] when `name` is new and the
    /// registry is full.
    pub fn register_or_get(&self, name: impl AsRef<[u8]>) -> Result<CounterId> {
        self.registry.register_or_get(name)
    }

    /// Returns the id of `name` if it was registered.
    pub fn lookup(&self, name: impl AsRef<[u8]>) -> Option<CounterId> {
        self.registry.lookup(name)
    }

    /// Resolves a registered name to its id.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownCounter`] if `name` was never registered.
    pub fn resolve(&self, name: impl AsRef<[u8]>) -> Result<CounterId> {
        let name = name.as_ref();
        self.registry
            .lookup(name)
            .ok_or_else(|| StatsError::UnknownCounter(CounterName::new(name).to_string_lossy()))
    }

    /// Returns the stored name of `id`.
    pub fn name_of(&self, id: CounterId) -> Option<CounterName> {
        self.registry.name_of(id)
    }

    #[inline]
    fn check(&self, id: CounterId) {
        assert!(
            self.registry.contains(id),
            "counter id {id} was not issued by this context ({} registered)",
            self.registry.len()
        );
    }

    // ---------------------------------------------------------------------
    // Thread blocks
    // ---------------------------------------------------------------------

    /// Runs `f` on the calling thread's block, creating it if needed.
    #[inline]
    fn with_block<R>(&self, f: impl FnOnce(&CounterBlock) -> R) -> R {
        THREAD_BLOCKS.with(|blocks| {
            if let Some(block) = self.cached_block(&blocks.borrow()) {
                // SAFETY: the entry was created by this context and its shard
                // table keeps a strong reference for as long as `self` lives.
                return f(unsafe { &*block });
            }
            let block = self.create_block();
            let result = f(block.as_ref());
            let mut blocks = blocks.borrow_mut();
            blocks.retain(|(_, cached)| cached.strong_count() > 0);
            blocks.push((self.instance, Arc::downgrade(&block)));
            result
        })
    }

    /// Runs `f` on the calling thread's block if it already has one.
    #[inline]
    fn peek_block<R>(&self, f: impl FnOnce(&CounterBlock) -> R) -> Option<R> {
        THREAD_BLOCKS.with(|blocks| {
            self.cached_block(&blocks.borrow())
                // SAFETY: as in `with_block`.
                .map(|block| f(unsafe { &*block }))
        })
    }

    #[inline]
    fn cached_block(&self, blocks: &[(u64, Weak<CounterBlock>)]) -> Option<*const CounterBlock> {
        blocks
            .iter()
            .find(|(instance, _)| *instance == self.instance)
            .map(|(_, block)| block.as_ptr())
    }

    fn create_block(&self) -> Arc<CounterBlock> {
        let processor = self.current_processor();
        let block = Arc::new(CounterBlock::new(self.registry.capacity(), processor));
        self.shards.insert(Arc::clone(&block));
        debug!(
            instance = self.instance,
            processor,
            thread = ?std::thread::current().id(),
            "created counter block"
        );
        block
    }

    // ---------------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------------

    /// Adds one to counter `id` in the calling thread's block.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    #[inline]
    pub fn increment(&self, id: CounterId) {
        self.add(id, 1);
    }

    /// Adds `n` to counter `id` in the calling thread's block.
    ///
    /// Never blocks once the calling thread has a block; the first call on a
    /// thread briefly locks one shard to link the new block.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    #[inline]
    pub fn add(&self, id: CounterId, n: u64) {
        self.check(id);
        self.with_block(|block| block.add(id.index(), n));
    }

    // ---------------------------------------------------------------------
    // Aggregation by id
    // ---------------------------------------------------------------------

    /// The calling thread's own count for `id`; 0 if it never touched a
    /// counter of this context.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn sum_thread(&self, id: CounterId) -> u64 {
        self.check(id);
        self.peek_block(|block| block.get(id.index())).unwrap_or(0)
    }

    /// Sum of `id` over the blocks created on the calling thread's current
    /// processor.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn sum_processor(&self, id: CounterId) -> u64 {
        self.check(id);
        self.shard_sum(self.current_processor(), id)
    }

    /// Sum of `id` over the blocks created on `processor`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::ProcessorOutOfRange`] if there is no such shard.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn sum_processor_on(&self, id: CounterId, processor: usize) -> Result<u64> {
        self.check(id);
        if processor >= self.shards.len() {
            return Err(StatsError::ProcessorOutOfRange {
                processor,
                count: self.shards.len(),
            });
        }
        Ok(self.shard_sum(processor, id))
    }

    /// Sum of `id` over every block in the process.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn sum_global(&self, id: CounterId) -> u64 {
        self.check(id);
        self.shards.sum(id.index())
    }

    /// Sum of `id` at the given granularity.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn sum(&self, id: CounterId, granularity: Granularity) -> u64 {
        match granularity {
            Granularity::Thread => self.sum_thread(id),
            Granularity::Processor => self.sum_processor(id),
            Granularity::Global => self.sum_global(id),
        }
    }

    /// Sum of `id` for each processor shard, indexed by processor.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this context.
    pub fn sum_per_processor(&self, id: CounterId) -> Vec<u64> {
        self.check(id);
        self.shards.iter().map(|shard| shard.sum(id.index())).collect()
    }

    fn shard_sum(&self, processor: usize, id: CounterId) -> u64 {
        self.shards
            .get(processor)
            .map(|shard| shard.sum(id.index()))
            .unwrap_or(0)
    }

    // ---------------------------------------------------------------------
    // Aggregation by name
    // ---------------------------------------------------------------------

    /// [`sum_thread`](Self::sum_thread) for a counter name.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownCounter`] if `name` was never registered.
    pub fn sum_thread_by_name(&self, name: impl AsRef<[u8]>) -> Result<u64> {
        Ok(self.sum_thread(self.resolve(name)?))
    }

    /// [`sum_processor`](Self::sum_processor) for a counter name.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownCounter`] if `name` was never registered.
    pub fn sum_processor_by_name(&self, name: impl AsRef<[u8]>) -> Result<u64> {
        Ok(self.sum_processor(self.resolve(name)?))
    }

    /// [`sum_global`](Self::sum_global) for a counter name.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownCounter`] if `name` was never registered.
    pub fn sum_global_by_name(&self, name: impl AsRef<[u8]>) -> Result<u64> {
        Ok(self.sum_global(self.resolve(name)?))
    }

    /// [`sum`](Self::sum) for a counter name.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::UnknownCounter`] if `name` was never registered.
    pub fn sum_by_name(&self, name: impl AsRef<[u8]>, granularity: Granularity) -> Result<u64> {
        Ok(self.sum(self.resolve(name)?, granularity))
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    /// Captures every registered counter summed at `granularity`.
    ///
    /// Each shard is locked once for the whole capture rather than once per
    /// counter.
    pub fn snapshot(&self, granularity: Granularity) -> StatsSnapshot {
        let len = self.registry.len();
        let (values, processor) = match granularity {
            Granularity::Thread => {
                let values = self
                    .peek_block(|block| (0..len).map(|i| block.get(i)).collect::<Vec<_>>())
                    .unwrap_or_else(|| vec![0; len]);
                (values, None)
            }
            Granularity::Processor => {
                let processor = self.current_processor();
                let values = self
                    .shards
                    .get(processor)
                    .map(|shard| shard.sum_all(len))
                    .unwrap_or_else(|| vec![0; len]);
                (values, Some(processor))
            }
            Granularity::Global => {
                let mut totals = vec![0u64; len];
                for shard in self.shards.iter() {
                    for (total, value) in totals.iter_mut().zip(shard.sum_all(len)) {
                        *total = total.wrapping_add(value);
                    }
                }
                (totals, None)
            }
        };

        let mut snapshot = StatsSnapshot::new(granularity, self.named(values));
        snapshot.processor = processor;
        snapshot
    }

    /// Captures every registered counter for each processor shard.
    pub fn processor_snapshot(&self) -> Vec<ProcessorSnapshot> {
        let len = self.registry.len();
        self.shards
            .iter()
            .enumerate()
            .map(|(processor, shard)| ProcessorSnapshot {
                processor,
                threads: shard.len(),
                counters: self.named(shard.sum_all(len)),
            })
            .collect()
    }

    fn named(&self, values: Vec<u64>) -> Vec<CounterSnapshot> {
        self.registry
            .iter()
            .zip(values)
            .map(|((id, name), value)| CounterSnapshot::new(id.index(), name.to_string_lossy(), value))
            .collect()
    }
}

impl Debug for Stats {
    /// Formats the context showing non-zero global counters.
    ///
    /// Output format: `Stats{ name:value name:value ... }`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stats{{")?;
        for counter in self.snapshot(Granularity::Global).non_zero() {
            write!(f, " {}:{}", counter.name, counter.value)?;
        }
        write!(f, " }}")
    }
}

// -------------------------------------------------------------------------
// Process-wide context
// -------------------------------------------------------------------------

static GLOBAL: OnceLock<Stats> = OnceLock::new();

/// Initializes the process-wide context with `config`.
///
/// The first successful call creates the context; every later call (and any
/// concurrent racing call) returns that same context. A later call whose
/// configuration differs in shape is logged and otherwise ignored.
///
/// # Errors
///
/// Returns [`StatsError::InvalidConfig`] if the context does not exist yet
/// and `config` does not validate.
pub fn init(config: StatsConfig) -> Result<&'static Stats> {
    if let Some(stats) = GLOBAL.get() {
        warn_if_reconfigured(stats, &config);
        return Ok(stats);
    }

    config.validate()?;
    let requested = config.clone();
    let mut created = false;
    let stats = GLOBAL.get_or_init(|| {
        created = true;
        Stats::build(config)
    });

    if created {
        info!(
            capacity = stats.capacity(),
            processors = stats.processor_count(),
            "counter context initialized"
        );
    } else {
        warn_if_reconfigured(stats, &requested);
    }
    Ok(stats)
}

/// Returns the process-wide context, creating it on first use.
///
/// If [`init`] was never called, the configuration comes from
/// [`StatsConfig::from_env`], falling back to the defaults if the
/// environment is malformed.
pub fn global() -> &'static Stats {
    if let Some(stats) = GLOBAL.get() {
        return stats;
    }
    let config = StatsConfig::from_env()
        .and_then(|config| config.validate().map(|_| config))
        .unwrap_or_else(|e| {
            warn!(error = %e, "ignoring counter configuration from environment");
            StatsConfig::default()
        });
    match init(config) {
        Ok(stats) => stats,
        // The default configuration always validates.
        Err(_) => GLOBAL.get_or_init(|| Stats::build(StatsConfig::default())),
    }
}

fn warn_if_reconfigured(stats: &Stats, requested: &StatsConfig) {
    if !stats.config.same_shape(requested) {
        warn!(
            capacity = stats.capacity(),
            requested_capacity = requested.capacity,
            "counter context already initialized; new configuration ignored"
        );
    }
}
