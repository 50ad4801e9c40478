//! Benchmarks for the dispatchers and task layer.
//!
//! Benchmarks cover:
//! - Raw job throughput on the recyclable and work-stealing pools
//! - Nested submission on the work-stealing pool (local deque path)
//! - Task handle spawn + join round trips
//! - Fan-out of many tasks awaited together

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use crossbeam_channel::bounded;
use lifecycle_scheduler::config::{RecyclablePoolConfig, WorkStealingConfig};
use lifecycle_scheduler::core::spawn;
use lifecycle_scheduler::fanout::await_all;
use lifecycle_scheduler::scheduler::{Dispatcher, RecyclablePool, WorkStealingPool};

use tokio::runtime::Runtime;

// ============================================================================
// Helper Functions
// ============================================================================

fn recyclable() -> Arc<dyn Dispatcher> {
    Arc::new(RecyclablePool::new(
        RecyclablePoolConfig::new("bench-recyclable").with_core_threads(num_cpus::get()),
    ))
}

fn stealing() -> Arc<dyn Dispatcher> {
    Arc::new(WorkStealingPool::new(WorkStealingConfig::new("bench-stealing")))
}

/// Submit `count` no-op jobs and wait until all of them ran.
fn run_jobs(dispatcher: &Arc<dyn Dispatcher>, count: u64) {
    let (tx, rx) = bounded(1024);
    for i in 0..count {
        let tx = tx.clone();
        dispatcher
            .execute(Box::new(move || {
                tx.send(black_box(i)).unwrap();
            }))
            .unwrap();
    }
    for _ in 0..count {
        rx.recv().unwrap();
    }
}

// ============================================================================
// Dispatcher Benchmarks
// ============================================================================

fn bench_job_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_throughput");
    let pools = [("recyclable", recyclable()), ("work_stealing", stealing())];

    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        for (label, pool) in &pools {
            group.bench_with_input(BenchmarkId::new(*label, size), &size, |b, &size| {
                b.iter(|| run_jobs(pool, size));
            });
        }
    }
    group.finish();
}

fn bench_nested_submission(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_submission");
    let pool = stealing();

    for fan in [16_u64, 128] {
        group.throughput(Throughput::Elements(fan * fan));
        group.bench_with_input(BenchmarkId::from_parameter(fan), &fan, |b, &fan| {
            b.iter(|| {
                let (tx, rx) = bounded(1024);
                for _ in 0..fan {
                    let inner = Arc::clone(&pool);
                    let tx = tx.clone();
                    pool.execute(Box::new(move || {
                        for j in 0..fan {
                            let tx = tx.clone();
                            inner
                                .execute(Box::new(move || tx.send(black_box(j)).unwrap()))
                                .unwrap();
                        }
                    }))
                    .unwrap();
                }
                for _ in 0..fan * fan {
                    rx.recv().unwrap();
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Task Benchmarks
// ============================================================================

fn bench_task_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = recyclable();

    c.bench_function("task_spawn_join", |b| {
        b.to_async(&rt).iter(|| {
            let handle = spawn(Arc::clone(&pool), async { Ok::<_, anyhow::Error>(black_box(7_u64)) });
            async move { handle.join().await.unwrap() }
        });
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = stealing();
    let mut group = c.benchmark_group("fan_out_await_all");

    for size in [10_u64, 100, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| {
                let handles: Vec<_> = (0..size)
                    .map(|i| spawn(Arc::clone(&pool), async move { Ok::<_, anyhow::Error>(i * 2) }))
                    .collect();
                async move { black_box(await_all(&handles).await.unwrap()) }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_job_throughput,
    bench_nested_submission,
    bench_task_round_trip,
    bench_fan_out
);
criterion_main!(benches);
