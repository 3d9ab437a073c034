//! Single-threaded push/pop throughput, and `populate`/`add_scattered`
//! setup cost at a range of sizes.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use objpool::{ObjPool, PoolConfig, RoundRobinPlacement};

fn benchmark_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("objpool_push_pop");

    for &num_cores in &[1usize, 4, 16] {
        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("round_trip_cores_{num_cores}"), |b| {
            let placement = RoundRobinPlacement::new(num_cores);
            let pool = ObjPool::init(placement, PoolConfig::embedded(1024, || 0u64))
                .expect("pool sized for 1024 u64 slots");

            b.iter(|| {
                let r = pool.pop().expect("pool never drained by this benchmark");
                black_box(r);
                pool.push(r);
            });
        });
    }

    group.finish();
}

fn benchmark_populate(c: &mut Criterion) {
    let mut group = c.benchmark_group("objpool_populate");

    for &count in &[100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_function(format!("populate_{count}"), |b| {
            b.iter(|| {
                let placement = RoundRobinPlacement::new(4);
                let mut pool = ObjPool::<[u8; 64]>::init(placement, PoolConfig::empty(0))
                    .expect("empty pool");
                let buf: &'static mut [u8] =
                    Box::leak(vec![0u8; count as usize * 64].into_boxed_slice());
                let inserted = unsafe { pool.populate(buf, 64, None).unwrap() };
                black_box(inserted);
                // Safety: nothing holds a reference into `buf` once fini runs.
                pool.fini(|_| {});
                unsafe { drop(Box::from_raw(buf as *mut [u8])) };
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_push_pop, benchmark_populate);
criterion_main!(benches);
