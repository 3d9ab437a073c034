//! End-to-end concurrent scenarios from spec.md §8, exercised with real
//! OS threads since `loom` cannot model full-scale concurrent churn
//! (see `tests/loom_tests.rs` for the narrower, exhaustively-checked
//! protocol model).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use objpool::{ObjPool, PoolConfig, RoundRobinPlacement};

#[test]
fn concurrent_churn_preserves_the_live_reference_count() {
    // spec.md §8 scenario 4 / §3 invariant 6: across all slots, the
    // live-reference multiset equals the initial allocated set minus
    // references currently held by callers. We check this by the proxy
    // of "every reference popped during the run is popped exactly once
    // and all are eventually back in the pool."
    const TOTAL: usize = 512;
    const THREADS: usize = 8;

    let placement = RoundRobinPlacement::new(THREADS);
    let pool = Arc::new(
        ObjPool::init(placement, PoolConfig::embedded(TOTAL, || 0u64))
            .expect("pool sized for 512 u64 slots"),
    );

    let total_pops = Arc::new(AtomicUsize::new(0));

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let pool = Arc::clone(&pool);
            let total_pops = Arc::clone(&total_pops);
            scope.spawn(move || {
                for _ in 0..2_000 {
                    if let Some(r) = pool.pop() {
                        total_pops.fetch_add(1, Ordering::Relaxed);
                        // Briefly hold the reference to widen the window
                        // for racing pops to observe a stalled slot.
                        thread::yield_now();
                        pool.push(r);
                    }
                }
            });
        }
    });

    assert!(total_pops.load(Ordering::Relaxed) > 0);

    let mut drained = 0;
    let mut seen = std::collections::HashSet::new();
    Arc::try_unwrap(pool)
        .ok()
        .expect("all worker threads joined")
        .fini(|obj| {
            if let objpool::DrainedObject::Element { ptr, .. } = obj {
                assert!(seen.insert(ptr.as_ptr() as usize), "duplicate live reference");
                drained += 1;
            }
        });
    assert_eq!(drained, TOTAL);
}

#[test]
fn full_pool_push_never_drops_a_reference() {
    // spec.md §8 scenario 5: requested > per_slot_capacity forces the
    // bounded push primitive; pushing back every popped reference under
    // contention must never silently drop one.
    const TOTAL: usize = 64;
    const THREADS: usize = 16;

    let placement = RoundRobinPlacement::new(4);
    let pool = Arc::new(
        ObjPool::init(
            placement,
            PoolConfig::embedded(TOTAL, || 0u32).with_asym(32),
        )
        .expect("pool sized for 64 u32 slots"),
    );
    assert!(pool.is_bounded(), "this sizing should force the bounded push primitive");

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let pool = Arc::clone(&pool);
            scope.spawn(move || {
                for _ in 0..500 {
                    if let Some(r) = pool.pop() {
                        pool.push(r);
                    }
                }
            });
        }
    });

    let mut drained = 0;
    Arc::try_unwrap(pool)
        .ok()
        .expect("all worker threads joined")
        .fini(|_| drained += 1);
    assert_eq!(drained, TOTAL);
}

#[test]
fn nmi_safe_pop_never_blocks_on_a_stalled_pusher() {
    // spec.md §4.1 "abandon on suspected in-flight push": a pop racing a
    // pusher that reserved a ticket but has not yet published its age
    // must return promptly (None or a different, ready slot) rather than
    // spin indefinitely — the property that makes pop interrupt-safe.
    let placement = RoundRobinPlacement::new(1);
    let pool = ObjPool::init(placement, PoolConfig::embedded(8, || 0u64)).unwrap();

    // Drain the single slot, then race many pops against nothing: every
    // call must return in bounded time (the test itself times out if it
    // doesn't, since this is an ordinary `#[test]` with no custom
    // timeout — a hang here is a correctness bug, not a slow pass).
    while pool.pop().is_some() {}
    for _ in 0..10_000 {
        assert!(pool.pop().is_none());
    }
}
