use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fleet_core::{DynamicGroup, Endpoint, EndpointSelector, RingHashConfig, SelectionKey, SelectionStrategy};

fn group_of(n: usize) -> Arc<DynamicGroup> {
    let group = Arc::new(DynamicGroup::new(true));
    let endpoints: Vec<Endpoint> = (0..n)
        .map(|i| Endpoint::parse(&format!("host-{i}.example:80")).unwrap().with_weight((i % 5) as u32 + 1))
        .collect();
    group.set_endpoints(endpoints);
    group
}

fn bench_round_robin_pick(c: &mut Criterion) {
    let selector = EndpointSelector::new(group_of(50), SelectionStrategy::round_robin());
    c.bench_function("selector_pick_round_robin_50", |b| {
        b.iter(|| black_box(selector.select_now(SelectionKey::from_u64(0))));
    });
}

fn bench_weighted_round_robin_pick(c: &mut Criterion) {
    let selector = EndpointSelector::new(group_of(50), SelectionStrategy::weighted_round_robin());
    c.bench_function("selector_pick_weighted_round_robin_50", |b| {
        b.iter(|| black_box(selector.select_now(SelectionKey::from_u64(0))));
    });
}

fn bench_ring_hash_pick(c: &mut Criterion) {
    let config = RingHashConfig::new(256).unwrap();
    let selector = EndpointSelector::new(group_of(50), SelectionStrategy::ring_hash(config));
    let mut key = 0u64;
    c.bench_function("selector_pick_ring_hash_50", |b| {
        b.iter(|| {
            key = key.wrapping_add(1);
            black_box(selector.select_now(SelectionKey::from_u64(key)))
        });
    });
}

criterion_group!(
    selector_pick_benches,
    bench_round_robin_pick,
    bench_weighted_round_robin_pick,
    bench_ring_hash_pick,
);
criterion_main!(selector_pick_benches);
