//! CPU topology primitives used for shard placement.
//!
//! The counter engine only needs two facts from the host: how many logical
//! processors exist, and which one the calling thread is running on right now.
//! Both are behind the [`Topology`] trait so that a context can be built with a
//! fixed, deterministic topology in tests.
//!
//! The current processor is a placement hint. It is read once, when a thread
//! creates its counter block, and never again for that block.

use std::fmt::Debug;

use crate::error::{Result, StatsError};

/// Source of processor count and current-processor information.
pub trait Topology: Send + Sync + Debug {
    /// Number of logical processors, and therefore shards. Never zero.
    fn processor_count(&self) -> usize;

    /// Index of the processor the calling thread is running on.
    ///
    /// Values outside `[0, processor_count())` are clamped by the caller.
    fn current_processor(&self) -> usize;
}

/// Topology backed by the operating system.
///
/// On Linux this uses `sysconf(_SC_NPROCESSORS_CONF)` and `sched_getcpu()`.
/// Elsewhere the processor count comes from
/// [`std::thread::available_parallelism`] and every thread reports processor 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTopology;

impl Topology for SystemTopology {
    fn processor_count(&self) -> usize {
        configured_processors()
    }

    #[inline]
    fn current_processor(&self) -> usize {
        current_processor()
    }
}

/// Topology with a fixed processor count whose current processor is taken from
/// a thread-local hint set with [`FixedTopology::set_current`].
///
/// Threads that never set a hint report processor 0.
///
/// # Examples
///
/// ```rust
/// use shardstat::topology::{FixedTopology, Topology};
///
/// let topo = FixedTopology::new(4);
/// assert_eq!(topo.current_processor(), 0);
/// FixedTopology::set_current(3);
/// assert_eq!(topo.current_processor(), 3);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedTopology {
    processors: usize,
}

thread_local! {
    static CURRENT_HINT: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

impl FixedTopology {
    /// Creates a topology reporting `processors` processors (at least one).
    pub fn new(processors: usize) -> Self {
        Self {
            processors: processors.max(1),
        }
    }

    /// Sets the processor reported to the calling thread.
    pub fn set_current(processor: usize) {
        CURRENT_HINT.with(|hint| hint.set(processor));
    }
}

impl Topology for FixedTopology {
    fn processor_count(&self) -> usize {
        self.processors
    }

    fn current_processor(&self) -> usize {
        CURRENT_HINT.with(|hint| hint.get())
    }
}

/// Returns the number of processors configured on the host.
#[cfg(target_os = "linux")]
pub fn configured_processors() -> usize {
    // SAFETY: sysconf has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if n > 0 {
        n as usize
    } else {
        available_processors()
    }
}

/// Returns the number of processors configured on the host.
#[cfg(not(target_os = "linux"))]
pub fn configured_processors() -> usize {
    available_processors()
}

fn available_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Returns the processor the calling thread is currently running on.
#[cfg(target_os = "linux")]
#[inline]
pub fn current_processor() -> usize {
    // SAFETY: sched_getcpu has no preconditions; it returns -1 on failure.
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        0
    } else {
        cpu as usize
    }
}

/// Returns the processor the calling thread is currently running on.
#[cfg(not(target_os = "linux"))]
#[inline]
pub fn current_processor() -> usize {
    0
}

/// Restricts the calling thread to run only on `processor`.
///
/// Worker threads call this before their first counter operation to control
/// which shard their block lands in.
///
/// # Errors
///
/// Returns [`StatsError::Affinity`] if the kernel rejects the mask, e.g.
/// because the processor is offline or outside the process's cpuset.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(processor: usize) -> Result<()> {
    // SAFETY: cpu_set_t is plain data; zeroed is the empty set.
    let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    if processor >= libc::CPU_SETSIZE as usize {
        return Err(StatsError::Affinity(std::io::Error::from_raw_os_error(
            libc::EINVAL,
        )));
    }
    // SAFETY: the index was checked against CPU_SETSIZE above.
    unsafe { libc::CPU_SET(processor, &mut set) };
    // SAFETY: pid 0 is the calling thread; the set lives across the call.
    let rc = unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) };
    if rc != 0 {
        return Err(StatsError::Affinity(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Restricts the calling thread to run only on `processor`.
///
/// Thread affinity is not supported on this platform; this is a no-op.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_processor: usize) -> Result<()> {
    Ok(())
}
