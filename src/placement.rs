//! Core/NUMA placement (spec.md §4.2 "Placement").
//!
//! Grounded in `other_examples/.../bugthesystem-Flux` and
//! `other_examples/.../debasishg-ringmpsc-rs`, both of which depend on
//! `libc`/`libnuma-sys` for exactly this concern; the teacher crate
//! itself is host-agnostic `no_std` and has no notion of cores.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Abstracts "which core am I on" and "how many cores exist" so the pool
/// is portable between a `std` host and a `no_std` embedded host that
/// determines its own core id some other way (e.g. reading a per-CPU
/// register, the way `other_examples/.../n1ght-hunter-rtmalloc/rseq/src/
/// percpu.rs` reads `rseq.cpu_id`).
pub trait CorePlacement: Send + Sync {
    /// Number of cores/slots to provision.
    fn num_cores(&self) -> usize;

    /// The calling thread's current core index, in `[0, num_cores())`.
    /// Used only to pick the starting point for cross-core search
    /// (spec.md §4.2): an imprecise value never breaks correctness,
    /// because `push`/`pop` still visit every slot before giving up.
    fn current_core(&self) -> usize;
}

/// Round-robin placement usable anywhere, including `no_std`: each call
/// to `current_core` advances an atomic counter modulo `num_cores`. Does
/// not track real cores, but spreads traffic evenly — the safe default
/// when no platform-specific `CorePlacement` is supplied.
pub struct RoundRobinPlacement {
    num_cores: usize,
    next: AtomicUsize,
}

impl RoundRobinPlacement {
    /// Build a round-robin placement over `num_cores` slots (clamped to
    /// at least 1).
    pub fn new(num_cores: usize) -> Self {
        Self {
            num_cores: num_cores.max(1),
            next: AtomicUsize::new(0),
        }
    }
}

impl CorePlacement for RoundRobinPlacement {
    fn num_cores(&self) -> usize {
        self.num_cores
    }

    fn current_core(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.num_cores
    }
}

#[cfg(feature = "std")]
mod std_placement {
    use super::CorePlacement;

    /// `std`-backed placement: `num_cores` from
    /// [`std::thread::available_parallelism`]; `current_core` from
    /// `libc::sched_getcpu` on Linux, falling back to core 0 elsewhere.
    pub struct StdPlacement {
        num_cores: usize,
    }

    impl StdPlacement {
        /// Probe the host for its available parallelism.
        #[must_use]
        pub fn detect() -> Self {
            let num_cores = std::thread::available_parallelism()
                .map(core::num::NonZeroUsize::get)
                .unwrap_or(1);
            Self { num_cores }
        }
    }

    impl CorePlacement for StdPlacement {
        fn num_cores(&self) -> usize {
            self.num_cores
        }

        #[cfg(target_os = "linux")]
        fn current_core(&self) -> usize {
            // Safety: sched_getcpu reads CPU placement via vDSO/getcpu(2),
            // no arguments, no aliasing concerns.
            let cpu = unsafe { libc::sched_getcpu() };
            if cpu < 0 {
                0
            } else {
                (cpu as usize) % self.num_cores.max(1)
            }
        }

        #[cfg(not(target_os = "linux"))]
        fn current_core(&self) -> usize {
            0
        }
    }
}

#[cfg(feature = "std")]
pub use std_placement::StdPlacement;

/// Run `f` with the calling thread temporarily pinned to NUMA node
/// `node`, so that any memory it touches (first-touch allocation) lands
/// on that node's physical memory. This is how `init`'s per-slot
/// allocation achieves "allocated on the memory node of the owning core"
/// (spec.md §4.2 "Placement") without a custom node-aware allocator.
///
/// A no-op returning `f()` directly when the `numa` feature is disabled.
#[cfg(feature = "numa")]
pub(crate) fn with_node_affinity<R>(node: usize, f: impl FnOnce() -> R) -> R {
    // Safety: numa_run_on_node is a plain libnuma call with no aliasing
    // or lifetime requirements; -1 restores the default node mask.
    unsafe {
        libnuma_sys::numa_run_on_node(node as i32);
    }
    let result = f();
    unsafe {
        libnuma_sys::numa_run_on_node(-1);
    }
    result
}

#[cfg(not(feature = "numa"))]
pub(crate) fn with_node_affinity<R>(_node: usize, f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_all_cores() {
        let p = RoundRobinPlacement::new(4);
        let seen: alloc::vec::Vec<usize> = (0..8).map(|_| p.current_core()).collect();
        assert_eq!(seen, [0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn zero_cores_clamped_to_one() {
        let p = RoundRobinPlacement::new(0);
        assert_eq!(p.num_cores(), 1);
        assert_eq!(p.current_core(), 0);
    }
}
