//! Per-processor shards of per-thread counter blocks.
//!
//! Every thread that touches a counter owns exactly one [`CounterBlock`]: a
//! fixed array with one slot per possible counter id. When the block is
//! created it is appended to the [`ProcessorShard`] of the processor the
//! thread was running on at that moment, and it stays there for the life of
//! the context, even after the thread exits.
//!
//! ```text
//!   ShardTable
//!   ┌──────────────────────┐
//!   │ cpu 0 (CachePadded)  │── Mutex<[block T0, block T4]>
//!   │ cpu 1 (CachePadded)  │── Mutex<[block T1]>
//!   │ cpu 2 (CachePadded)  │── Mutex<[]>
//!   │ cpu 3 (CachePadded)  │── Mutex<[block T2, block T3]>
//!   └──────────────────────┘
//!
//!   block T0: [ req: 120 | bytes: 4096 | errors: 0 | ... capacity slots ]
//! ```
//!
//! The shard lock only guards list membership. Slot values are written by
//! the owning thread with plain relaxed stores and read by aggregators with
//! relaxed loads, so a sum sees each slot at some value it actually held
//! while the shard was locked.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

/// One thread's private array of counter values.
pub struct CounterBlock {
    processor: usize,
    counts: Box<[AtomicU64]>,
}

impl CounterBlock {
    /// Creates a zeroed block with `capacity` slots, placed on `processor`.
    pub fn new(capacity: usize, processor: usize) -> Self {
        Self {
            processor,
            counts: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Processor whose shard holds this block.
    #[inline]
    pub fn processor(&self) -> usize {
        self.processor
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.counts.len()
    }

    /// Current value of slot `index`.
    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        self.counts[index].load(Ordering::Relaxed)
    }

    /// Adds `n` to slot `index`, wrapping on overflow.
    ///
    /// Only the owning thread may call this: the read-modify-write is not
    /// atomic, it relies on there being a single writer per block.
    #[inline]
    pub(crate) fn add(&self, index: usize, n: u64) {
        let slot = &self.counts[index];
        slot.store(slot.load(Ordering::Relaxed).wrapping_add(n), Ordering::Relaxed);
    }
}

impl Debug for CounterBlock {
    /// Formats the block showing non-zero slots.
    ///
    /// Output format: `cpu{ [slot]:value [slot]:value ... }`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cpu{}{{", self.processor)?;
        for (i, slot) in self.counts.iter().enumerate() {
            let val = slot.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

/// The blocks created by threads while running on one processor.
#[derive(Debug, Default)]
pub struct ProcessorShard {
    blocks: Mutex<Vec<Arc<CounterBlock>>>,
}

impl ProcessorShard {
    /// Creates an empty shard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block to this shard.
    pub fn insert(&self, block: Arc<CounterBlock>) {
        self.blocks.lock().push(block);
    }

    /// Number of blocks in this shard.
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Returns `true` if no thread has created a block on this processor.
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Sums slot `index` over every block of this shard.
    pub fn sum(&self, index: usize) -> u64 {
        self.blocks
            .lock()
            .iter()
            .fold(0u64, |acc, block| acc.wrapping_add(block.get(index)))
    }

    /// Sums the first `len` slots over every block of this shard, in one
    /// traversal.
    pub fn sum_all(&self, len: usize) -> Vec<u64> {
        let mut totals = vec![0u64; len];
        for block in self.blocks.lock().iter() {
            for (index, total) in totals.iter_mut().enumerate() {
                *total = total.wrapping_add(block.get(index));
            }
        }
        totals
    }
}

/// One [`ProcessorShard`] per processor, each on its own cache line.
pub struct ShardTable {
    shards: Box<[CachePadded<ProcessorShard>]>,
}

impl ShardTable {
    /// Creates `processors` empty shards (at least one).
    pub fn new(processors: usize) -> Self {
        Self {
            shards: (0..processors.max(1))
                .map(|_| CachePadded::new(ProcessorShard::new()))
                .collect(),
        }
    }

    /// Number of shards.
    #[inline]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always `false`: a table has at least one shard.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Returns the shard of `processor`, if it exists.
    #[inline]
    pub fn get(&self, processor: usize) -> Option<&ProcessorShard> {
        self.shards.get(processor).map(|shard| &**shard)
    }

    /// Iterates over all shards in processor order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessorShard> + '_ {
        self.shards.iter().map(|shard| &**shard)
    }

    /// Links `block` into the shard named by its processor.
    ///
    /// # Panics
    ///
    /// Panics if the block's processor has no shard.
    pub fn insert(&self, block: Arc<CounterBlock>) {
        let processor = block.processor();
        assert!(
            processor < self.shards.len(),
            "block placed on processor {processor}, but only {} shards exist",
            self.shards.len()
        );
        self.shards[processor].insert(block);
    }

    /// Sums slot `index` over every block of every shard.
    pub fn sum(&self, index: usize) -> u64 {
        self.iter()
            .fold(0u64, |acc, shard| acc.wrapping_add(shard.sum(index)))
    }

    /// Total number of blocks across all shards.
    pub fn block_count(&self) -> usize {
        self.iter().map(ProcessorShard::len).sum()
    }
}

impl Debug for ShardTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(ProcessorShard::len))
            .finish()
    }
}
