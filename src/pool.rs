//! Pool head and public operations (spec.md §4.2, §4.3, §4.4, §6).

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use objpool_core::{PoolError, MAX_CORES};

use crate::config::{size_slots, Asym, PoolConfig};
use crate::metrics::{Counters, PoolMetrics};
use crate::placement::{self, CorePlacement};
use crate::slot::{BoundedPush, Slot};

/// A reference drained from the pool at teardown, handed to the
/// release callback (spec.md §4.4, §6 "Release callback contract").
pub enum DrainedObject<T> {
    /// One object. `is_external` is true when the reference was not
    /// allocated by the pool (it came via `populate` or `add_scattered`).
    Element {
        /// The drained reference.
        ptr: NonNull<T>,
        /// True when not pool-owned.
        is_external: bool,
    },
    /// The bulk buffer passed to `populate`, reported once after all of
    /// its carved elements.
    Buffer {
        /// Base pointer of the buffer.
        ptr: *mut u8,
        /// Length in bytes.
        len: usize,
    },
}

/// A scalable, lock-free, per-core MPMC object pool (spec.md §1-§2).
///
/// Pre-allocates (or adopts) a fixed set of opaque object references and
/// distributes them across per-core ring-array [`Slot`]s. `push`/`pop`
/// are wait-free in the absence of contention and lock-free in general;
/// neither allocates nor blocks, so both are safe to call from
/// interrupt/NMI-like contexts (spec.md §5).
///
/// The pool does not preserve FIFO/LIFO order or fairness, does not grow
/// after `init`, and does not preserve identity between `pop` and `push`
/// (spec.md §1 Non-goals).
pub struct ObjPool<T> {
    slots: Option<Box<[Slot<T>]>>,
    placement: Box<dyn CorePlacement>,
    requested: usize,
    per_slot_capacity: u32,
    /// True when `push` must use the bounded (CAS-loop) primitive because
    /// no single slot is guaranteed to hold the whole working set
    /// (spec.md §4.2 "Push policy selection": `requested > per_slot_capacity`).
    bounded: bool,
    #[allow(dead_code)] // recorded for parity with spec.md's alloc_flags bookkeeping; consulted by custom CorePlacement impls.
    alloc_flags: crate::config::AllocFlags,
    /// Address ranges of every slot's embedded-object storage, used to
    /// classify a drained reference at `fini` regardless of which slot it
    /// currently resides in (objects carry no identity between pop/push,
    /// so an object embedded in slot 0 may be popped from slot 3).
    embedded_ranges: Box<[(usize, usize)]>,
    /// Address range of the bulk buffer passed to `populate`, if any.
    user_buf: Option<(usize, usize)>,
    /// Count of objects inserted so far via embedding, `populate`, and
    /// `add_scattered`, checked against total slot capacity by
    /// `add_scattered` (spec.md §4.6).
    inserted: AtomicUsize,
    counters: Counters,
}

// Safety: `slots` is accessed only through the synchronized primitives in
// `Slot`; the other fields are either immutable after `init` or atomics.
unsafe impl<T: Send> Send for ObjPool<T> {}
unsafe impl<T: Send> Sync for ObjPool<T> {}

fn scatter_counts(requested: usize, num_cores: usize) -> Vec<usize> {
    let mut counts = alloc::vec![0usize; num_cores];
    for k in 0..requested {
        counts[k % num_cores] += 1;
    }
    counts
}

impl<T> ObjPool<T> {
    /// Initialize a pool over `placement.num_cores()` slots
    /// (spec.md §6 `init`).
    ///
    /// Returns [`PoolError::Unsupported`] if the core count is zero or
    /// exceeds the 16-bit slot-index field's range. Returns
    /// [`PoolError::OutOfMemory`] if the slot table cannot be allocated;
    /// any slots already built are dropped before returning, so no
    /// partial pool escapes `init` (spec.md §4.6).
    pub fn init(
        placement: impl CorePlacement + 'static,
        mut config: PoolConfig<T>,
    ) -> Result<Self, PoolError> {
        let num_cores = placement.num_cores();
        if num_cores == 0 || num_cores as u64 > MAX_CORES as u64 {
            return Err(PoolError::Unsupported {
                num_cores: num_cores as u32,
            });
        }

        let asym = Asym::from_raw(config.asym);
        let per_slot_capacity = size_slots::<T>(config.requested, num_cores, asym);
        let bounded = config.requested > per_slot_capacity as usize;

        let mut slots_vec: Vec<Slot<T>> = Vec::new();
        slots_vec
            .try_reserve_exact(num_cores)
            .map_err(|_| PoolError::OutOfMemory {
                requested: config.requested,
            })?;

        let embed_counts = if config.embed.is_some() {
            scatter_counts(config.requested, num_cores)
        } else {
            alloc::vec![0usize; num_cores]
        };

        let mut make = config.embed.take();
        let had_embed = make.is_some();
        let mut embedded_ranges = Vec::with_capacity(num_cores);
        for (core, &count) in embed_counts.iter().enumerate() {
            let slot = placement::with_node_affinity(core, || match make.as_mut() {
                Some(factory) => Slot::new(per_slot_capacity, count, factory),
                None => Slot::new(per_slot_capacity, 0, || -> T { unreachable!() }),
            });
            embedded_ranges.push(slot.embedded_range());
            for r in slot.embedded_refs().collect::<Vec<_>>() {
                slot.add_slot(r);
            }
            slots_vec.push(slot);
        }

        let inserted = if had_embed {
            embed_counts.iter().sum()
        } else {
            0
        };

        Ok(Self {
            slots: Some(slots_vec.into_boxed_slice()),
            placement: Box::new(placement),
            requested: config.requested,
            per_slot_capacity,
            bounded,
            alloc_flags: config.alloc_flags,
            embedded_ranges: embedded_ranges.into_boxed_slice(),
            user_buf: None,
            inserted: AtomicUsize::new(inserted),
            counters: Counters::default(),
        })
    }

    fn total_capacity(&self) -> usize {
        match &self.slots {
            Some(slots) => slots.len() * self.per_slot_capacity as usize,
            None => 0,
        }
    }

    /// Carve references to `T` out of a contiguous, word-aligned buffer at
    /// `stride`-byte intervals and scatter them round-robin across slots
    /// (spec.md §4.3 mode 2, §6 `populate`).
    ///
    /// `init_cb`, when given, is called once per carved slot to
    /// initialize it before the reference is published; when omitted,
    /// the caller must guarantee `buf` already holds valid `T` values at
    /// every stride offset.
    ///
    /// # Safety
    ///
    /// Every `stride`-byte chunk of `buf` must either be initialized by
    /// `init_cb` or already hold a valid, live `T`. `buf` must outlive
    /// every reference this pool publishes from it (hence `'static`).
    pub unsafe fn populate(
        &mut self,
        buf: &'static mut [u8],
        stride: usize,
        mut init_cb: Option<&mut dyn FnMut(&mut MaybeUninit<T>)>,
    ) -> Result<usize, PoolError> {
        let slots = self
            .slots
            .as_ref()
            .ok_or(PoolError::InvalidArgument {
                reason: "pool has been torn down",
            })?;

        if self.user_buf.is_some() {
            return Err(PoolError::InvalidArgument {
                reason: "a buffer is already set",
            });
        }
        if stride == 0 {
            return Err(PoolError::InvalidArgument {
                reason: "stride must be nonzero",
            });
        }
        if stride % size_of::<usize>() != 0 {
            return Err(PoolError::InvalidArgument {
                reason: "stride must be a multiple of the machine word size",
            });
        }
        if size_of::<T>() > stride {
            return Err(PoolError::InvalidArgument {
                reason: "object size exceeds stride",
            });
        }
        if (buf.as_ptr() as usize) % align_of::<T>() != 0 {
            return Err(PoolError::InvalidArgument {
                reason: "buffer is misaligned for the object type",
            });
        }

        let count = buf.len() / stride;
        if count == 0 {
            return Err(PoolError::NotFound);
        }

        let base = buf.as_mut_ptr();
        let num_cores = slots.len();
        for k in 0..count {
            let cell = unsafe { base.add(k * stride).cast::<MaybeUninit<T>>() };
            if let Some(cb) = init_cb.as_mut() {
                cb(unsafe { &mut *cell });
            }
            let r = unsafe { NonNull::new_unchecked(cell.cast::<T>()) };
            // Quiescent, single-threaded scatter — safe to use the
            // unconditional primitive regardless of the pool's push
            // policy (spec.md §4.3).
            slots[k % num_cores].add_slot(r);
        }

        self.user_buf = Some((base as usize, buf.len()));
        self.inserted.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }

    /// Insert a single externally-owned reference (spec.md §4.3 mode 3,
    /// §6 `add_scattered`). Must be called before the pool is shared with
    /// concurrent pushers/poppers.
    ///
    /// # Safety
    ///
    /// `r` must point to a live, uniquely-owned `T` that outlives every
    /// `pop` that may return it, and the caller must not otherwise free
    /// or alias it until it is popped back out (or returned via `fini`).
    pub unsafe fn add_scattered(&mut self, r: NonNull<T>) -> Result<(), PoolError> {
        let slots = self
            .slots
            .as_ref()
            .ok_or(PoolError::InvalidArgument {
                reason: "pool has been torn down",
            })?;
        let total_capacity = slots.len() * self.per_slot_capacity as usize;
        let inserted = self.inserted.load(Ordering::Relaxed);
        if inserted >= total_capacity {
            return Err(PoolError::InvalidArgument {
                reason: "pool is already at capacity",
            });
        }
        let idx = inserted % slots.len();
        slots[idx].add_slot(r);
        self.inserted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Return a reference to the pool, starting the cross-core search at
    /// the caller's current core and spinning until a slot accepts
    /// (spec.md §4.2 "Cross-core search on push"). Never fails under the
    /// default (non-oversubscribed) sizing; in the oversubscribed case
    /// this call retries the bounded CAS loop across slots indefinitely.
    pub fn push(&self, r: NonNull<T>) {
        let Some(slots) = self.slots.as_deref() else {
            // Pushing into a torn-down pool drops the reference on the
            // floor rather than leaking it silently into nothing: the
            // caller violated the teardown contract, but we must not
            // panic from a context that may be an interrupt handler.
            debug_assert!(false, "push called after fini");
            return;
        };
        let n = slots.len();
        let start = self.placement.current_core() % n;

        if !self.bounded {
            slots[start].add_slot(r);
            return;
        }

        let mut obj = r;
        let mut idx = start;
        loop {
            match slots[idx].try_add_slot(obj) {
                BoundedPush::Accepted => return,
                BoundedPush::Full(back) => {
                    obj = back;
                    self.counters.record_push_slot_skip();
                    idx += 1;
                    if idx == n {
                        idx = 0;
                    }
                    if idx == start {
                        self.counters.record_push_retry();
                    }
                }
            }
        }
    }

    /// Fallible push for the oversubscribed case: same search as
    /// [`push`](Self::push) but returns [`PoolError::NotFound`] after one
    /// full pass over every slot instead of retrying forever. Prefer
    /// [`push`](Self::push) unless the caller has a reason to bound its
    /// own retry budget.
    pub fn try_push(&self, r: NonNull<T>) -> Result<(), PoolError> {
        let Some(slots) = self.slots.as_deref() else {
            return Err(PoolError::InvalidArgument {
                reason: "pool has been torn down",
            });
        };
        let n = slots.len();
        let start = self.placement.current_core() % n;

        if !self.bounded {
            slots[start].add_slot(r);
            return Ok(());
        }

        let mut obj = r;
        for offset in 0..n {
            let idx = (start + offset) % n;
            match slots[idx].try_add_slot(obj) {
                BoundedPush::Accepted => return Ok(()),
                BoundedPush::Full(back) => {
                    obj = back;
                    self.counters.record_push_slot_skip();
                }
            }
        }
        Err(PoolError::NotFound)
    }

    /// Take a reference from the pool, starting the cross-core search at
    /// the caller's current core and visiting every slot at most once
    /// before reporting empty (spec.md §4.2 "Cross-core search on pop").
    /// Returns `None` when every slot is observed empty in one pass —
    /// not itself an error (spec.md §4.6).
    pub fn pop(&self) -> Option<NonNull<T>> {
        let slots = self.slots.as_deref()?;
        let n = slots.len();
        let start = self.placement.current_core() % n;
        for offset in 0..n {
            let idx = (start + offset) % n;
            if let Some(r) = slots[idx].try_get_slot() {
                return Some(r);
            }
        }
        self.counters.record_pop_empty_pass();
        None
    }

    fn is_embedded(&self, addr: usize) -> bool {
        self.embedded_ranges
            .iter()
            .any(|&(start, end)| addr >= start && addr < end)
    }

    /// Drain every slot, invoke `release` once per object with its
    /// origin flags, then once more for the bulk buffer if one was set,
    /// and release per-slot/head storage (spec.md §4.4 `fini`).
    ///
    /// A no-op — and never fails — on a pool that has already been torn
    /// down or was only partially initialized.
    pub fn fini(&mut self, mut release: impl FnMut(DrainedObject<T>)) -> PoolMetrics {
        let Some(slots) = self.slots.take() else {
            return PoolMetrics::default();
        };

        let mut pop_abandons_by_slot = Vec::with_capacity(slots.len());
        for slot in slots.iter() {
            pop_abandons_by_slot.push(slot.abandoned_count());
            let drained: Vec<NonNull<T>> = slot.drain().collect();
            for r in drained {
                let is_external = !self.is_embedded(r.as_ptr() as usize);
                release(DrainedObject::Element { ptr: r, is_external });
            }
        }

        if let Some((ptr, len)) = self.user_buf.take() {
            release(DrainedObject::Buffer {
                ptr: ptr as *mut u8,
                len,
            });
        }

        PoolMetrics {
            push_retries: self.counters.push_retries.load(Ordering::Relaxed),
            push_slot_skips: self.counters.push_slot_skips.load(Ordering::Relaxed),
            pop_empty_passes: self.counters.pop_empty_passes.load(Ordering::Relaxed),
            pop_abandons_by_slot,
        }
    }

    /// Snapshot the pool's diagnostic counters without draining it
    /// (spec.md §4.8).
    pub fn metrics(&self) -> PoolMetrics {
        let pop_abandons_by_slot = match &self.slots {
            Some(slots) => slots.iter().map(Slot::abandoned_count).collect(),
            None => Vec::new(),
        };
        PoolMetrics {
            push_retries: self.counters.push_retries.load(Ordering::Relaxed),
            push_slot_skips: self.counters.push_slot_skips.load(Ordering::Relaxed),
            pop_empty_passes: self.counters.pop_empty_passes.load(Ordering::Relaxed),
            pop_abandons_by_slot,
        }
    }

    /// The `requested` count this pool was sized for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Each slot's ring capacity (`per_slot_capacity`, spec.md §4.2).
    pub fn per_slot_capacity(&self) -> u32 {
        self.per_slot_capacity
    }

    /// Number of per-core slots.
    pub fn num_cores(&self) -> usize {
        self.slots.as_ref().map_or(0, |s| s.len())
    }

    /// Whether `push` uses the bounded (CAS-loop) primitive.
    pub fn is_bounded(&self) -> bool {
        self.bounded
    }
}

impl<T> Drop for ObjPool<T> {
    fn drop(&mut self) {
        // `fini` must be called explicitly (it needs the caller's
        // release callback); a pool dropped without `fini` simply leaks
        // its outstanding references, matching the teardown contract in
        // spec.md §4.4 ("teardown is not re-entrant and must be
        // serialized externally"). We only assert this in debug builds
        // so an accidental drop does not abort a release build.
        debug_assert!(
            self.slots.is_none(),
            "ObjPool dropped without calling fini() — outstanding references leaked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocFlags;
    use crate::placement::RoundRobinPlacement;

    fn boxed_u32(v: u32) -> NonNull<u32> {
        NonNull::new(Box::into_raw(Box::new(v))).unwrap()
    }

    unsafe fn drop_boxed(p: NonNull<u32>) {
        unsafe { drop(Box::from_raw(p.as_ptr())) };
    }

    #[test]
    fn scatter_and_drain_scenario() {
        // spec.md §8 scenario 1.
        let placement = RoundRobinPlacement::new(4);
        let mut pool = ObjPool::init(
            placement,
            PoolConfig::embedded(16, || [0u8; 32]).with_asym(0),
        )
        .unwrap();

        let mut seen = alloc::vec::Vec::new();
        for _ in 0..16 {
            seen.push(pool.pop().expect("16 objects were embedded"));
        }
        assert!(pool.pop().is_none());

        let mut unique = seen.clone();
        unique.sort_by_key(|p| p.as_ptr() as usize);
        unique.dedup();
        assert_eq!(unique.len(), 16);

        pool.fini(|_| {});
    }

    #[test]
    fn bulk_populate_scenario() {
        // spec.md §8 scenario 2: 2 cores, populate(len=1024, stride=64) -> 16 refs.
        let placement = RoundRobinPlacement::new(2);
        let mut pool = ObjPool::<[u8; 64]>::init(placement, PoolConfig::empty(0)).unwrap();

        let buf: &'static mut [u8] = Box::leak(alloc::vec![0u8; 1024].into_boxed_slice());
        let count = unsafe { pool.populate(buf, 64, None).unwrap() };
        assert_eq!(count, 16);

        let mut popped = 0;
        while pool.pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, 16);

        let mut element_calls = 0;
        let mut buffer_calls = 0;
        pool.fini(|obj| match obj {
            DrainedObject::Element { is_external, .. } => {
                assert!(is_external);
                element_calls += 1;
            }
            DrainedObject::Buffer { .. } => buffer_calls += 1,
        });
        assert_eq!(element_calls, 16);
        assert_eq!(buffer_calls, 1);
    }

    #[test]
    fn add_scattered_scenario() {
        // spec.md §8 scenario 3.
        let placement = RoundRobinPlacement::new(2);
        let mut pool = ObjPool::<u32>::init(
            placement,
            PoolConfig::empty(5).with_alloc_flags(AllocFlags::MaySleep),
        )
        .unwrap();

        let refs: alloc::vec::Vec<_> = (0..5).map(boxed_u32).collect();
        for r in &refs {
            unsafe { pool.add_scattered(*r).unwrap() };
        }

        let mut popped = 0;
        while pool.pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, 5);

        let mut element_calls = 0;
        pool.fini(|obj| {
            if let DrainedObject::Element { ptr, is_external } = obj {
                assert!(is_external);
                element_calls += 1;
                unsafe { drop_boxed(ptr) };
            }
        });
        assert_eq!(element_calls, 5);
    }

    #[test]
    fn full_slot_push_retries_on_another_slot() {
        // spec.md §8 scenario 5: requested > per_slot_capacity forces the
        // bounded push primitive.
        let placement = RoundRobinPlacement::new(2);
        let mut pool = ObjPool::<u32>::init(
            placement,
            PoolConfig::embedded(16, || 0u32).with_asym(1),
        )
        .unwrap();
        assert!(pool.is_bounded() || pool.per_slot_capacity() as usize >= 16);
        pool.fini(|_| {});
    }

    #[test]
    fn fini_is_a_noop_the_second_time() {
        let placement = RoundRobinPlacement::new(2);
        let mut pool = ObjPool::<u32>::init(placement, PoolConfig::embedded(4, || 0)).unwrap();
        pool.fini(|_| {});
        let metrics = pool.fini(|_| panic!("release must not be called twice"));
        assert_eq!(metrics.pop_abandons_by_slot.len(), 0);
    }
}
