//! spec.md §8 S2 — ring-hash stability: a fixed key keeps mapping to the
//! same endpoint across membership churn, disturbed only in proportion to
//! the weight added/removed.

use std::sync::Arc;

use fleet_core::{DynamicGroup, Endpoint, EndpointSelector, RingHashConfig, SelectionKey, SelectionStrategy};

fn ep(host: &str, weight: u32) -> Endpoint {
    Endpoint::parse(host).unwrap().with_weight(weight)
}

#[test]
fn key_survives_adding_then_removing_one_endpoint() {
    let group = Arc::new(DynamicGroup::new(true));
    group.set_endpoints(vec![ep("foo:1", 1), ep("bar:1", 2), ep("baz:1", 3)]);

    let strategy = SelectionStrategy::ring_hash(RingHashConfig::new(256).unwrap());
    let selector = EndpointSelector::new(group.clone(), strategy);

    let key = SelectionKey::from_bytes(b"user-42");
    let before = selector.select_now(key).unwrap();

    group.set_endpoints(vec![ep("foo:1", 1), ep("bar:1", 2), ep("baz:1", 3), ep("qux:1", 1)]);
    let with_qux = selector.select_now(key);
    // Adding a weight-1 endpoint to a total of 7 disturbs only the vnodes
    // it claims; this key has better than (1 - 1/7) odds of surviving.
    let same_as_before = with_qux.as_ref() == Some(&before);

    group.set_endpoints(vec![ep("foo:1", 1), ep("bar:1", 2), ep("baz:1", 3)]);
    let after_removal = selector.select_now(key).unwrap();
    assert_eq!(after_removal, before, "removing qux must restore the original ring exactly");

    // Not asserted strictly (probabilistic), but record the expectation
    // this scenario documents: most keys are untouched by one endpoint's
    // churn.
    let _ = same_as_before;
}

#[test]
fn same_key_is_stable_across_many_repeated_reads() {
    let group = Arc::new(DynamicGroup::new(true));
    group.set_endpoints(vec![ep("foo:1", 1), ep("bar:1", 2), ep("baz:1", 3)]);
    let strategy = SelectionStrategy::ring_hash(RingHashConfig::new(64).unwrap());
    let selector = EndpointSelector::new(group, strategy);

    let key = SelectionKey::from_bytes(b"user-42");
    let first = selector.select_now(key);
    for _ in 0..50 {
        assert_eq!(selector.select_now(key), first);
    }
}
