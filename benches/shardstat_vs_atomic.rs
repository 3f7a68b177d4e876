use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shardstat::{Stats, StatsConfig};

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 1_000_000;

fn bench_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_increment");
    let label = format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD);

    group.bench_function(BenchmarkId::new("Stats (per-thread blocks)", &label), |b| {
        b.iter(|| {
            let stats = Arc::new(Stats::new(StatsConfig::new().with_capacity(64)).unwrap());
            let id = stats.register_or_get("bench").unwrap();
            let mut handles = vec![];

            for _ in 0..NUM_THREADS {
                let stats = Arc::clone(&stats);
                handles.push(thread::spawn(move || {
                    for _ in 0..ITERATIONS_PER_THREAD {
                        stats.increment(id);
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(stats.sum_global(id))
        })
    });

    group.bench_function(BenchmarkId::new("AtomicU64 (single)", &label), |b| {
        b.iter(|| {
            let counter = Arc::new(AtomicU64::new(0));
            let mut handles = vec![];

            for _ in 0..NUM_THREADS {
                let counter = Arc::clone(&counter);
                handles.push(thread::spawn(move || {
                    for _ in 0..ITERATIONS_PER_THREAD {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(counter.load(Ordering::Relaxed))
        })
    });

    group.finish();
}

fn bench_macro(c: &mut Criterion) {
    c.bench_function("stat_inc! (cached id)", |b| {
        b.iter(|| shardstat::stat_inc!(bench_macro))
    });
}

fn bench_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_sum");
    let stats = Arc::new(Stats::new(StatsConfig::new().with_capacity(64)).unwrap());
    let id = stats.register_or_get("bench").unwrap();

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let stats = Arc::clone(&stats);
            thread::spawn(move || stats.add(id, 10))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    group.bench_function("sum_thread", |b| b.iter(|| black_box(stats.sum_thread(id))));
    group.bench_function("sum_processor", |b| {
        b.iter(|| black_box(stats.sum_processor(id)))
    });
    group.bench_function("sum_global", |b| b.iter(|| black_box(stats.sum_global(id))));
    group.finish();
}

criterion_group!(benches, bench_increment, bench_macro, bench_sum);
criterion_main!(benches);
