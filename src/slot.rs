//! Per-core ring-array slot: the lock-free MPMC primitive object pool
//! operations are built from (spec.md §4.1).
//!
//! Concurrency invariants, verbatim from spec.md §3:
//!
//! 1. `size` is a power of two; `mask == size - 1`.
//! 2. `head <= tail` (mod 2^32); occupancy `= tail - head` in `[0, size]`.
//! 3. Position `i` with `head <= i < tail` is ready for `pop` iff
//!    `ages[i & mask] == i`.
//! 4. `head` and `tail` start at `size`, not zero, so the first epoch a
//!    push publishes differs from zero-initialized `ages`.
//! 5. Epoch tags are monotone mod 2^32 and tolerate wraparound.
//! 6. Across all slots the live-reference multiset equals the initial
//!    allocated set minus references currently held by callers.

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use objpool_core::{Index, CACHE_LINE};

/// Minimum per-slot capacity for references to `T`, per spec.md §3:
/// `size >= L1_cache_line_bytes / (4 + sizeof(ref))`, rounded to a power
/// of two. The epoch tag is 4 bytes (`u32`); the entry is one pointer.
pub(crate) fn minimum_slot_capacity<T>() -> u32 {
    let entry_bytes = 4 + size_of::<NonNull<T>>();
    let raw = CACHE_LINE.div_ceil(entry_bytes);
    (raw.max(1) as u32).next_power_of_two()
}

const HEAD_PAD: usize = CACHE_LINE - size_of::<Index>();
const TAIL_PAD: usize = CACHE_LINE - size_of::<Index>();

/// Outcome of the bounded (CAS-loop) push primitive.
pub(crate) enum BoundedPush<T> {
    /// The reference was accepted.
    Accepted,
    /// The slot was full; the reference is handed back so the caller can
    /// try the next slot in cross-core search order.
    Full(NonNull<T>),
}

/// A single core's fixed-capacity MPMC ring of object references.
///
/// `head` and `tail` are placed on separate cache lines: every operation
/// on this slot, regardless of which core issues it, either reads/writes
/// `head` (pop's commit) or `tail` (push's ticket), so keeping the two
/// counters apart avoids false sharing between concurrent pushers and
/// poppers even though — unlike the teacher ring's SPSC design — there is
/// no single core that owns either role exclusively.
#[repr(C)]
pub(crate) struct Slot<T> {
    head: Index,
    _pad_head: [u8; HEAD_PAD],
    tail: Index,
    _pad_tail: [u8; TAIL_PAD],

    size: u32,
    mask: u32,
    ages: Box<[Index]>,
    ents: Box<[UnsafeCell<MaybeUninit<NonNull<T>>>]>,

    /// Per-slot embedded object storage (spec.md §4.3 mode 1). Empty
    /// (`len() == 0`) when this slot holds no pool-allocated objects.
    /// Kept as one contiguous allocation per slot, matching the original
    /// "objsz bytes at the tail of each slot" layout, expressed here as
    /// an explicit boxed array instead of trailing pointer arithmetic
    /// (spec.md §9 "Manual memory layout").
    embedded: Box<[UnsafeCell<MaybeUninit<T>>]>,

    /// Count of `pop` attempts that abandoned this slot because `head`
    /// had not advanced across one inner retry (spec.md §9: "should
    /// become a counter/metric rather than a log line").
    abandoned: AtomicU64,
}

// Safety: `ents`/`embedded` entries are only read/written under the
// push/pop protocols below, which establish happens-before via `ages`
// (Acquire/Release) and `head`/`tail` (CAS). No two threads touch the
// same position without that synchronization.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    /// Build an empty slot with ring capacity `size` (must be a power of
    /// two) and `embedded_count` pool-owned objects, each produced by
    /// `make`. The embedded objects are **not** scattered into the ring
    /// here — `Pool::scatter` does that during single-threaded init.
    pub(crate) fn new(size: u32, embedded_count: usize, mut make: impl FnMut() -> T) -> Self {
        debug_assert!(size.is_power_of_two());
        let mut ages = alloc::vec::Vec::with_capacity(size as usize);
        let mut ents = alloc::vec::Vec::with_capacity(size as usize);
        for _ in 0..size {
            ages.push(Index::new(0));
            ents.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        let mut embedded = alloc::vec::Vec::with_capacity(embedded_count);
        for _ in 0..embedded_count {
            embedded.push(UnsafeCell::new(MaybeUninit::new(make())));
        }
        Self {
            head: Index::new(size),
            _pad_head: [0; HEAD_PAD],
            tail: Index::new(size),
            _pad_tail: [0; TAIL_PAD],
            size,
            mask: size - 1,
            ages: ages.into_boxed_slice(),
            ents: ents.into_boxed_slice(),
            embedded: embedded.into_boxed_slice(),
            abandoned: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u32 {
        self.size
    }

    #[inline]
    pub(crate) fn abandoned_count(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Address range `[start, end)` of this slot's embedded object
    /// storage, used by `fini` to classify a drained reference as
    /// embedded vs. not (spec.md §4.4).
    pub(crate) fn embedded_range(&self) -> (usize, usize) {
        if self.embedded.is_empty() {
            return (0, 0);
        }
        let start = self.embedded.as_ptr() as usize;
        let end = start + self.embedded.len() * size_of::<UnsafeCell<MaybeUninit<T>>>();
        (start, end)
    }

    /// Pointers to this slot's embedded objects, in storage order. Used
    /// once, during initial scatter, to seed the ring.
    pub(crate) fn embedded_refs(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        self.embedded
            .iter()
            .map(|cell| unsafe { NonNull::new_unchecked(cell.get().cast::<T>()) })
    }

    /// Unconditional push (spec.md §4.1 "Push (unconditional)"). Only
    /// correct when the caller has ensured this slot always has room —
    /// i.e. `requested <= per_slot_capacity` pool-wide.
    pub(crate) fn add_slot(&self, r: NonNull<T>) {
        let t = self.tail.fetch_increment();
        let i = (t & self.mask) as usize;
        unsafe { (*self.ents[i].get()).write(r) };
        // Release publishes the write above to any pop that Acquire-loads
        // this same age value.
        self.ages[i].store(t);
    }

    /// Bounded push (spec.md §4.1 "Push (bounded)"): CAS loop over
    /// `tail`, failing with `Full` when the slot is observed full.
    pub(crate) fn try_add_slot(&self, r: NonNull<T>) -> BoundedPush<T> {
        let mut t = self.tail.load_relaxed();
        loop {
            let h = self.head.load();
            if t.wrapping_sub(h) >= self.size {
                return BoundedPush::Full(r);
            }
            match self.tail.compare_exchange(t, t.wrapping_add(1)) {
                Ok(_) => {
                    let i = (t & self.mask) as usize;
                    unsafe { (*self.ents[i].get()).write(r) };
                    self.ages[i].store(t);
                    return BoundedPush::Accepted;
                }
                Err(observed) => t = observed,
            }
        }
    }

    /// Pop (spec.md §4.1 "Pop"). Returns `None` either because the slot
    /// is genuinely empty (`head == tail`) or because a concurrent push
    /// has reserved a ticket but not yet published its age tag — the
    /// abandon branch lets cross-core search move on rather than spin on
    /// a single stalled pusher (spec.md §4.6, §5 reentrancy).
    pub(crate) fn try_get_slot(&self) -> Option<NonNull<T>> {
        let mut h = self.head.load();
        loop {
            let t = self.tail.load();
            if h == t {
                return None;
            }

            let i = (h & self.mask) as usize;
            let age = self.ages[i].load();
            if age == h {
                let ent = unsafe { (*self.ents[i].get()).assume_init() };
                match self.head.compare_exchange(h, h.wrapping_add(1)) {
                    Ok(_) => return Some(ent),
                    Err(observed) => {
                        h = observed;
                        continue;
                    }
                }
            }

            // Not ready: this position's pusher has a ticket but hasn't
            // published its age yet. Reload head; if it hasn't advanced
            // since our last observation, abandon this slot.
            let reloaded = self.head.load();
            if reloaded == h {
                self.abandoned.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            h = reloaded;
        }
    }

    /// Drain every reference currently in the slot by repeated `pop`,
    /// used by `fini`. Not safe to call concurrently with live push/pop —
    /// teardown is externally serialized (spec.md §5).
    pub(crate) fn drain(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        core::iter::from_fn(move || self.try_get_slot())
    }
}
