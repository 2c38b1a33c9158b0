use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fleet_core::ConcurrencyLimit;
use tokio::runtime::Runtime;

fn bench_uncontended_acquire_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limit = ConcurrencyLimit::new(64, 0, Duration::from_secs(5));

    c.bench_function("concurrency_limit_uncontended_acquire_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let permit = limit.acquire().await.unwrap();
                black_box(&permit);
                drop(permit);
            });
        });
    });
}

fn bench_contended_acquire_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let limit = ConcurrencyLimit::new(4, 32, Duration::from_secs(5));

    c.bench_function("concurrency_limit_contended_acquire_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let tasks: Vec<_> = (0..16)
                    .map(|_| {
                        let limit = limit.clone();
                        tokio::spawn(async move {
                            let permit = limit.acquire().await.unwrap();
                            drop(permit);
                        })
                    })
                    .collect();
                for task in tasks {
                    task.await.unwrap();
                }
            });
        });
    });
}

criterion_group!(
    concurrency_limit_benches,
    bench_uncontended_acquire_release,
    bench_contended_acquire_release,
);
criterion_main!(concurrency_limit_benches);
