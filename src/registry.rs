//! Name registry mapping counter names to dense ids.
//!
//! The registry is a fixed arena of `capacity` entries plus a fixed table of
//! hash buckets. Each bucket is the head of a singly linked chain threaded
//! through the arena by index. Ids are handed out by a cursor that only moves
//! forward, so the valid ids are always exactly `0..len()`.
//!
//! ```text
//!   buckets                 entries (arena, indexed by CounterId)
//!   ┌─────┐                 ┌──────────────┬──────┐
//!   │  0  │──► 2 ──► 0      │ 0: "req"     │ NIL  │
//!   │  1  │    NIL          │ 1: "bytes"   │ NIL  │
//!   │  2  │──► 1            │ 2: "errors"  │  0   │
//!   │ ... │                 │ 3: (free)    │      │
//!   └─────┘                 └──────────────┴──────┘
//!                                   ▲ next_id = 3
//! ```
//!
//! Lookups never lock. Registration takes the registry lock, re-checks the
//! chain and then publishes the new entry: the entry is written first, the
//! cursor second, the bucket head last. A reader that finds an id through a
//! bucket is therefore guaranteed to see it as valid.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{Result, StatsError};

/// Maximum number of name bytes kept by the registry.
///
/// Longer names are truncated. Two names that only differ after this many
/// bytes map to the same counter.
pub const MAX_NAME_LEN: usize = 16;

const HASH_SEED0: u32 = 0x12a3_fe2d;
const HASH_SEED1: u32 = 0x37ab_e8f9;
const HASH_MULTIPLIER: u32 = 7_152_373;

const NIL: usize = usize::MAX;

/// A counter name, truncated to [`MAX_NAME_LEN`] bytes.
///
/// # Examples
///
/// ```rust
/// use shardstat::registry::{CounterName, MAX_NAME_LEN};
///
/// let short = CounterName::new("req");
/// assert_eq!(short.as_bytes(), b"req");
///
/// let long = CounterName::new("a_very_long_counter_name");
/// assert_eq!(long.len(), MAX_NAME_LEN);
/// assert_eq!(long, CounterName::new("a_very_long_counter_xyz"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterName {
    bytes: [u8; MAX_NAME_LEN],
    len: u8,
}

impl CounterName {
    /// Creates a name from the first [`MAX_NAME_LEN`] bytes of `name`.
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        let name = name.as_ref();
        let len = name.len().min(MAX_NAME_LEN);
        let mut bytes = [0u8; MAX_NAME_LEN];
        bytes[..len].copy_from_slice(&name[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// The stored (possibly truncated) name bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of stored bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` for the empty name.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The name as text. Truncation may split a multi-byte character, in
    /// which case the partial character is replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl From<&str> for CounterName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Dense handle of a registered counter.
///
/// Ids are only produced by a registry, in registration order starting at 0.
/// Using an id with a context other than the one that issued it is a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterId(u32);

impl CounterId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        CounterId(index as u32)
    }

    /// Position of this counter in every thread's counter block.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hashes a counter name with a two-accumulator rolling hash.
///
/// The result is deterministic across runs and platforms; it only selects a
/// bucket and is never persisted.
pub fn hash_name(name: &[u8]) -> u32 {
    let mut h0 = HASH_SEED0;
    let mut h1 = HASH_SEED1;
    for &b in name {
        let mut h = h1.wrapping_add(h0 ^ (b as u32).wrapping_mul(HASH_MULTIPLIER));
        if h & 0x8000_0000 != 0 {
            h = h.wrapping_sub(0x7fff_ffff);
        }
        h1 = h0;
        h0 = h;
    }
    h0 << 1
}

#[derive(Debug)]
struct Entry {
    name: OnceLock<CounterName>,
    next: AtomicUsize,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            name: OnceLock::new(),
            next: AtomicUsize::new(NIL),
        }
    }
}

/// Fixed-capacity map from counter names to dense [`CounterId`]s.
///
/// # Examples
///
/// ```rust
/// use shardstat::registry::Registry;
///
/// let registry = Registry::new(4, 16);
/// let req = registry.register_or_get("req").unwrap();
/// let err = registry.register_or_get("errors").unwrap();
///
/// assert_eq!(req.index(), 0);
/// assert_eq!(err.index(), 1);
/// assert_eq!(registry.register_or_get("req").unwrap(), req);
/// assert_eq!(registry.lookup("errors"), Some(err));
/// assert_eq!(registry.lookup("missing"), None);
/// ```
pub struct Registry {
    entries: Box<[Entry]>,
    buckets: Box<[AtomicUsize]>,
    next_id: AtomicUsize,
    lock: Mutex<()>,
}

impl Registry {
    /// Creates an empty registry holding at most `capacity` names, with
    /// `table_size` hash buckets.
    ///
    /// Both values are clamped to at least 1.
    pub fn new(capacity: usize, table_size: usize) -> Self {
        let entries = (0..capacity.max(1)).map(|_| Entry::default()).collect();
        let buckets = (0..table_size.max(1))
            .map(|_| AtomicUsize::new(NIL))
            .collect();
        Self {
            entries,
            buckets,
            next_id: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }

    /// Maximum number of distinct names.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of hash buckets.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    /// Number of registered names. Valid ids are `0..len()`.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing has been registered yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` was issued by this registry.
    #[inline]
    pub fn contains(&self, id: CounterId) -> bool {
        id.index() < self.len()
    }

    fn bucket_of(&self, name: &CounterName) -> usize {
        hash_name(name.as_bytes()) as usize % self.buckets.len()
    }

    fn find(&self, name: &CounterName, bucket: usize) -> Option<CounterId> {
        let mut cursor = self.buckets[bucket].load(Ordering::Acquire);
        while cursor != NIL {
            let entry = &self.entries[cursor];
            if entry.name.get() == Some(name) {
                return Some(CounterId::new(cursor));
            }
            cursor = entry.next.load(Ordering::Acquire);
        }
        None
    }

    /// Looks up a name without registering it.
    pub fn lookup(&self, name: impl AsRef<[u8]>) -> Option<CounterId> {
        let name = CounterName::new(name);
        self.find(&name, self.bucket_of(&name))
    }

    /// Returns the id of `name`, registering it first if needed.
    ///
    /// Concurrent calls with the same name return the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::CapacityExhausted`] if `name` is new and all
    /// `capacity()` ids are taken. Existing names keep resolving.
    pub fn register_or_get(&self, name: impl AsRef<[u8]>) -> Result<CounterId> {
        let name = CounterName::new(name);
        let bucket = self.bucket_of(&name);
        if let Some(id) = self.find(&name, bucket) {
            return Ok(id);
        }

        let _guard = self.lock.lock();
        if let Some(id) = self.find(&name, bucket) {
            return Ok(id);
        }

        let index = self.next_id.load(Ordering::Relaxed);
        if index == self.entries.len() {
            error!(name = %name, capacity = self.entries.len(), "counter capacity exhausted");
            return Err(StatsError::CapacityExhausted {
                capacity: self.entries.len(),
            });
        }

        let entry = &self.entries[index];
        // Slot `index` has never been handed out, so the cell is empty.
        let _ = entry.name.set(name);
        let head = &self.buckets[bucket];
        entry.next.store(head.load(Ordering::Relaxed), Ordering::Relaxed);
        self.next_id.store(index + 1, Ordering::Release);
        head.store(index, Ordering::Release);

        debug!(name = %name, id = index, bucket, "registered counter");
        Ok(CounterId::new(index))
    }

    /// Returns the stored name of a registered counter.
    pub fn name_of(&self, id: CounterId) -> Option<CounterName> {
        if !self.contains(id) {
            return None;
        }
        self.entries[id.index()].name.get().copied()
    }

    /// Iterates over registered counters in id order.
    pub fn iter(&self) -> impl Iterator<Item = (CounterId, CounterName)> + '_ {
        (0..self.len()).filter_map(move |index| {
            self.entries[index]
                .name
                .get()
                .map(|name| (CounterId::new(index), *name))
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("table_size", &self.table_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_hash_empty_name_is_seed() {
        assert_eq!(hash_name(b""), HASH_SEED0 << 1);
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(hash_name(b"a"), 0xe74b_53e2);
        assert_eq!(hash_name(b"req"), 0x1f0e_ae26);
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_name(b"requests"), hash_name(b"requests"));
        assert_ne!(hash_name(b"requests"), hash_name(b"responses"));
    }

    #[test]
    fn test_name_truncation() {
        let a = CounterName::new("0123456789abcdef_first");
        let b = CounterName::new("0123456789abcdef_second");
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), b"0123456789abcdef");
        assert_eq!(a.to_string(), "0123456789abcdef");
    }

    #[test]
    fn test_name_empty() {
        let name = CounterName::new("");
        assert!(name.is_empty());
        assert_eq!(name.len(), 0);
    }

    #[test]
    fn test_name_lossy_on_split_char() {
        // 15 ASCII bytes followed by a 2-byte character: only its first byte fits.
        let name = CounterName::new("aaaaaaaaaaaaaaaé");
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(name.to_string_lossy().starts_with("aaaaaaaaaaaaaaa"));
    }

    #[test]
    fn test_register_idempotent() {
        let registry = Registry::new(8, 4);
        let first = registry.register_or_get("req").unwrap();
        let second = registry.register_or_get("req").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids_are_dense() {
        let registry = Registry::new(8, 4);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            assert_eq!(registry.register_or_get(name).unwrap().index(), i);
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_single_bucket_chains() {
        let registry = Registry::new(8, 1);
        let ids: Vec<_> = ["x", "y", "z"]
            .iter()
            .map(|n| registry.register_or_get(n).unwrap())
            .collect();
        assert_eq!(registry.lookup("x"), Some(ids[0]));
        assert_eq!(registry.lookup("y"), Some(ids[1]));
        assert_eq!(registry.lookup("z"), Some(ids[2]));
        assert_eq!(registry.lookup("w"), None);
    }

    #[test]
    fn test_truncated_names_collide() {
        let registry = Registry::new(8, 4);
        let a = registry.register_or_get("0123456789abcdef_one").unwrap();
        let b = registry.register_or_get("0123456789abcdef_two").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_capacity_boundary() {
        let registry = Registry::new(4, 8);
        for name in ["a", "b", "c", "d"] {
            assert!(registry.register_or_get(name).is_ok());
        }
        assert!(matches!(
            registry.register_or_get("e"),
            Err(StatsError::CapacityExhausted { capacity: 4 })
        ));
        // Still refused, and nothing was reused.
        assert!(registry.register_or_get("f").is_err());
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.register_or_get("c").unwrap().index(), 2);
    }

    #[test]
    fn test_name_of_and_iter() {
        let registry = Registry::new(4, 4);
        let a = registry.register_or_get("alpha").unwrap();
        let b = registry.register_or_get("beta").unwrap();
        assert_eq!(registry.name_of(a), Some(CounterName::new("alpha")));
        assert_eq!(registry.name_of(CounterId::new(3)), None);

        let all: Vec<_> = registry.iter().collect();
        assert_eq!(
            all,
            vec![(a, CounterName::new("alpha")), (b, CounterName::new("beta"))]
        );
    }

    #[test]
    fn test_concurrent_registration_dense() {
        const THREADS: usize = 8;
        const NAMES: usize = 64;

        let registry = Arc::new(Registry::new(NAMES, 16));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..NAMES)
                        .map(|i| {
                            // Each thread walks the names in a different order.
                            let n = (i + t * 7) % NAMES;
                            (n, registry.register_or_get(format!("c{n}")).unwrap())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(registry.len(), NAMES);

        // Every thread agrees on every name's id.
        for pairs in &results[1..] {
            for &(n, id) in pairs {
                let expected = results[0].iter().find(|(m, _)| *m == n).unwrap().1;
                assert_eq!(id, expected);
            }
        }

        let ids: HashSet<usize> = results[0].iter().map(|(_, id)| id.index()).collect();
        assert_eq!(ids, (0..NAMES).collect::<HashSet<_>>());
    }
}
