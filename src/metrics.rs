//! Pool-wide diagnostics (spec.md §4.8, resolving the §9 open question:
//! "a diagnostic on long spin counts ... should become a counter/metric
//! rather than a log line"). The teacher crate is `no_std` and never
//! logs; counters are the teacher-idiomatic way to surface this without
//! pulling in a tracing backend.

use core::sync::atomic::{AtomicU64, Ordering};

/// Pool-wide counters, incremented with `Relaxed` ordering since they are
/// diagnostics, not synchronization.
#[derive(Default)]
pub(crate) struct Counters {
    /// Times the bounded push CAS loop retried after losing a race on
    /// `tail`.
    pub(crate) push_retries: AtomicU64,
    /// Times cross-core push search had to move to the next slot because
    /// the current one was full (bounded policy only).
    pub(crate) push_slot_skips: AtomicU64,
    /// Times a `pop` pass observed every slot empty.
    pub(crate) pop_empty_passes: AtomicU64,
}

impl Counters {
    pub(crate) fn record_push_retry(&self) {
        self.push_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_push_slot_skip(&self) {
        self.push_slot_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pop_empty_pass(&self) {
        self.pop_empty_passes.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of a pool's diagnostic counters, including
/// each slot's abandoned-pop count (spec.md §4.1 "abandon on suspected
/// in-flight push").
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    /// Total bounded-push CAS retries across the pool's lifetime.
    pub push_retries: u64,
    /// Total times bounded push skipped a full slot during cross-core
    /// search.
    pub push_slot_skips: u64,
    /// Total times a `pop` call observed every slot empty.
    pub pop_empty_passes: u64,
    /// Per-slot count of pops that abandoned the slot because `head` had
    /// not advanced across one inner retry.
    pub pop_abandons_by_slot: alloc::vec::Vec<u64>,
}
