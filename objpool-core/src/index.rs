//! Atomic index abstraction for slot `head`/`tail`/epoch counters.
//!
//! Mirrors the teacher's `Index` split (a thin, `#[repr(transparent)]`
//! wrapper so `[Index; N]` layouts predictably) but every objpool index is
//! concurrently writable — there is no non-atomic fast path here, because
//! the pool's whole reason for existing is safe concurrent access from
//! arbitrary (including interrupt) contexts.
//!
//! `tests/loom_tests.rs` exhaustively explores interleavings of this same
//! epoch-tag protocol using a small, self-contained model (the teacher's
//! `debasishg-ringmpsc-rs` loom suite takes the same approach: loom models
//! the protocol shape, not the production generic type directly, since
//! `loom`'s atomics are a distinct type from `core`'s and the production
//! `Slot<T>` is generic over arbitrary `T`).

use core::sync::atomic::{AtomicU32, Ordering};

/// A 32-bit monotone counter used for `head`, `tail`, and per-entry epoch
/// tags (`ages[i]`).
///
/// Epoch tags wrap modulo 2^32; spec.md §3 invariant 5 accepts this
/// because wrapping through ~4*10^9 pushes of one slot position within a
/// single scheduler tick is infeasible. A 64-bit tag is a strictly safer
/// alternative on 64-bit platforms (spec.md §9 open question) but would
/// double the size of the hot `ages[]` array per slot; 32 bits is kept to
/// match the spec's literal field widths.
#[repr(transparent)]
pub struct Index(AtomicU32);

impl Index {
    /// Construct an index initialized to `val`.
    #[inline]
    pub fn new(val: u32) -> Self {
        Self(AtomicU32::new(val))
    }

    /// Acquire-load. Used whenever the value read gates a subsequent read
    /// of data published by the writer (e.g. reading `ages[i]` before
    /// trusting `ents[i]`).
    #[inline]
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Relaxed load. Used for reading one's own previously-published value
    /// or for advisory checks that are re-validated by a later
    /// acquire/CAS (e.g. the producer peeking at its own `tail`).
    #[inline]
    pub fn load_relaxed(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Release-store. Publishes prior plain writes (e.g. `ents[i]`) to any
    /// thread that later observes this value with an acquire load.
    #[inline]
    pub fn store(&self, val: u32) {
        self.0.store(val, Ordering::Release);
    }

    /// Fetch-and-increment with `AcqRel` ordering, returning the
    /// pre-increment value (the pusher's ticket).
    #[inline]
    pub fn fetch_increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel)
    }

    /// Compare-and-swap with `AcqRel` success ordering and `Acquire`
    /// failure ordering. Used by both the bounded push CAS loop
    /// (`tail`) and the pop commit CAS (`head`).
    #[inline]
    pub fn compare_exchange(&self, current: u32, new: u32) -> Result<u32, u32> {
        self.0
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Exclusive-access load, for contexts holding `&mut` (e.g. `fini`
    /// draining a slot no other thread can reach).
    #[inline]
    pub fn load_mut(&mut self) -> u32 {
        *self.0.get_mut()
    }

    /// Exclusive-access store.
    #[inline]
    pub fn store_mut(&mut self, val: u32) {
        *self.0.get_mut() = val;
    }
}
