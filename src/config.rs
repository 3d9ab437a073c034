//! Pool configuration (spec.md §4.2 "Sizing", §6 `init` parameters).
//!
//! A plain builder/struct, not an external config-file format: this
//! mirrors the teacher, which configures `SpillRing` entirely through
//! cargo features and constructor parameters and never reaches for a
//! config crate.

use alloc::boxed::Box;

use crate::slot::minimum_slot_capacity;

/// Whether the calling context permits the allocator to sleep.
///
/// Spec.md §4.2 "Placement": this selects between a "large/paged"
/// allocator (may sleep, used for >= one page slots) and a "small/atomic"
/// allocator (never sleeps). Rust's `GlobalAlloc` trait does not expose
/// that distinction the way the kernel's `GFP_*` flags do, so in this
/// crate the flag is recorded and honored by `CorePlacement` impls that
/// care (e.g. a `no_std` embedded allocator with a non-blocking pool) but
/// the default `std` placement uses the ordinary global allocator either
/// way — see DESIGN.md for this open question's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocFlags {
    /// The caller may block waiting for memory (e.g. ordinary process
    /// context at `init` time).
    MaySleep,
    /// The caller must never block (e.g. interrupt context); only
    /// non-blocking allocation paths may be used.
    AtomicOnly,
}

/// Per-core balance mode (spec.md §4.2 "Sizing", `asym` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asym {
    /// `asym == 0`: divide `requested` evenly across cores.
    Balanced,
    /// `asym == 1`: any single core's slot can hold all `requested`
    /// objects (the performance mode).
    SingleCoreCapable,
    /// `asym > 1`: divide `requested` by this factor instead of by core
    /// count.
    Factor(u32),
}

impl Asym {
    /// Parse the literal `asym` wire value from spec.md §6's API table.
    pub fn from_raw(asym: u32) -> Self {
        match asym {
            0 => Asym::Balanced,
            1 => Asym::SingleCoreCapable,
            n => Asym::Factor(n),
        }
    }

    fn divisor(self, num_cores: usize) -> usize {
        match self {
            Asym::Balanced => num_cores.max(1),
            Asym::SingleCoreCapable => 1,
            Asym::Factor(n) => n.max(1) as usize,
        }
    }
}

/// Compute each slot's capacity (`nents`) per spec.md §4.2:
///
/// 1. `nents = requested / divisor(asym)`.
/// 2. Raise to the minimum that fits one cache line.
/// 3. Round up to a power of two.
/// 4. Double until `nents * num_cores >= requested`.
pub(crate) fn size_slots<T>(requested: usize, num_cores: usize, asym: Asym) -> u32 {
    let divisor = asym.divisor(num_cores);
    let raw = requested.div_ceil(divisor.max(1));
    let mut nents = raw.max(minimum_slot_capacity::<T>() as usize) as u32;
    nents = nents.next_power_of_two();
    while (nents as usize).saturating_mul(num_cores.max(1)) < requested {
        nents = nents.saturating_mul(2);
    }
    nents
}

/// Factory used to produce embedded objects at `init` time (spec.md §4.3
/// mode 1). `None` corresponds to `objsz == 0` ("skip embedding").
pub type EmbedFactory<T> = Box<dyn FnMut() -> T + Send>;

/// Configuration passed to [`crate::ObjPool::init`].
pub struct PoolConfig<T> {
    /// Total object count the pool is sized for (spec.md `count`).
    pub requested: usize,
    /// Balance mode (spec.md `asym`).
    pub asym: u32,
    /// Allocation context hint (spec.md `alloc_flags`).
    pub alloc_flags: AllocFlags,
    /// `Some` to pre-populate the pool with pool-owned ("embedded")
    /// objects produced by this factory, one per requested slot
    /// (spec.md `objsz > 0`). `None` to skip embedding and populate
    /// later via `populate`/`add_scattered` (spec.md `objsz == 0`).
    pub embed: Option<EmbedFactory<T>>,
}

impl<T> PoolConfig<T> {
    /// A config with no embedded objects: the pool is sized for
    /// `requested` but starts empty, to be filled by `populate` or
    /// `add_scattered`.
    pub fn empty(requested: usize) -> Self {
        Self {
            requested,
            asym: 0,
            alloc_flags: AllocFlags::MaySleep,
            embed: None,
        }
    }

    /// A config that embeds `requested` pool-owned objects, each
    /// produced by `make`.
    pub fn embedded(requested: usize, make: impl FnMut() -> T + Send + 'static) -> Self {
        Self {
            requested,
            asym: 0,
            alloc_flags: AllocFlags::MaySleep,
            embed: Some(Box::new(make)),
        }
    }

    /// Builder method: set the balance mode.
    pub fn with_asym(mut self, asym: u32) -> Self {
        self.asym = asym;
        self
    }

    /// Builder method: set the allocation-context flag.
    pub fn with_alloc_flags(mut self, flags: AllocFlags) -> Self {
        self.alloc_flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_sizing_matches_scatter_and_drain_scenario() {
        // spec.md §8 scenario 1: 4 cores, 16 objects, balanced.
        let nents = size_slots::<[u8; 32]>(16, 4, Asym::Balanced);
        assert_eq!(nents as usize * 4 >= 16, true);
        assert!(nents.is_power_of_two());
    }

    #[test]
    fn single_core_capable_sizing_holds_all_objects() {
        // spec.md §8 B2: asym = 1 => per_slot_capacity >= count.
        let nents = size_slots::<u64>(32, 8, Asym::SingleCoreCapable);
        assert!(nents >= 32);
    }

    #[test]
    fn small_counts_still_meet_minimum_capacity() {
        // spec.md §8 B1.
        let min = minimum_slot_capacity::<u64>();
        let nents = size_slots::<u64>(1, 64, Asym::Balanced);
        assert_eq!(nents, min);
    }
}
