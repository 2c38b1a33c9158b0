//! spec.md §8 invariants 3 and 4: over arbitrary weight assignments, WRR
//! distributes exactly by weight within one window, and weighted-random
//! distributes exactly by weight within one full turn.

use std::collections::HashMap;

use fleet_core::{DynamicGroup, Endpoint, EndpointSelector, SelectionKey, SelectionStrategy};
use proptest::prelude::*;

fn weighted_group(weights: &[u32]) -> (std::sync::Arc<DynamicGroup>, u64) {
    let group = std::sync::Arc::new(DynamicGroup::new(true));
    let endpoints: Vec<Endpoint> = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| Endpoint::parse(&format!("host-{i}.example:80")).unwrap().with_weight(w))
        .collect();
    let total: u64 = weights.iter().map(|&w| w as u64).sum();
    group.set_endpoints(endpoints);
    (group, total)
}

proptest! {
    #[test]
    fn wrr_window_matches_declared_weights(weights in prop::collection::vec(1u32..=20, 1..8)) {
        let (group, total) = weighted_group(&weights);
        let selector = EndpointSelector::new(group, SelectionStrategy::weighted_round_robin());

        let mut counts: HashMap<String, u64> = HashMap::new();
        for _ in 0..total {
            let picked = selector.select_now(SelectionKey::from_u64(0)).unwrap();
            *counts.entry(picked.authority()).or_insert(0) += 1;
        }

        for (i, &w) in weights.iter().enumerate() {
            let host = format!("host-{i}.example:80");
            prop_assert_eq!(counts.get(&host).copied().unwrap_or(0), w as u64);
        }
    }

    #[test]
    fn weighted_random_turn_matches_declared_weights(weights in prop::collection::vec(1u32..=20, 1..8)) {
        let (group, total) = weighted_group(&weights);
        let selector = EndpointSelector::new(group, SelectionStrategy::weighted_random());

        let mut counts: HashMap<String, u64> = HashMap::new();
        for _ in 0..total {
            let picked = selector.select_now(SelectionKey::from_u64(0)).unwrap();
            *counts.entry(picked.authority()).or_insert(0) += 1;
        }

        for (i, &w) in weights.iter().enumerate() {
            let host = format!("host-{i}.example:80");
            prop_assert_eq!(counts.get(&host).copied().unwrap_or(0), w as u64);
        }
    }

    #[test]
    fn ring_hash_adding_one_endpoint_disturbs_a_minority_of_keys(weights in prop::collection::vec(1u32..=10, 2..6)) {
        use fleet_core::RingHashConfig;

        let (before_group, total) = weighted_group(&weights);
        let before = EndpointSelector::new(before_group, SelectionStrategy::ring_hash(RingHashConfig::new(256).unwrap()));

        let mut with_extra = weights.clone();
        with_extra.push(1);
        let (after_group, _) = weighted_group(&with_extra);
        let after = EndpointSelector::new(after_group, SelectionStrategy::ring_hash(RingHashConfig::new(256).unwrap()));

        let mut disturbed = 0u64;
        let samples = 500u64;
        for i in 0..samples {
            let key = SelectionKey::from_u64(i);
            if before.select_now(key).map(|e| e.authority()) != after.select_now(key).map(|e| e.authority()) {
                disturbed += 1;
            }
        }
        let new_total = total + 1;
        let expected_share = 1.0 / new_total as f64;
        prop_assert!(
            (disturbed as f64) < (samples as f64) * (expected_share * 4.0 + 0.1),
            "disturbed={disturbed}/{samples}, expected_share={expected_share}"
        );
    }

    #[test]
    fn zero_weight_endpoints_are_never_picked(weights in prop::collection::vec(0u32..=5, 2..8)) {
        prop_assume!(weights.iter().any(|&w| w > 0));
        let (group, total) = weighted_group(&weights);
        let selector = EndpointSelector::new(group, SelectionStrategy::weighted_round_robin());

        for _ in 0..(total * 2) {
            let picked = selector.select_now(SelectionKey::from_u64(0)).unwrap();
            let idx: usize = picked.authority().trim_start_matches("host-").split('.').next().unwrap().parse().unwrap();
            prop_assert!(weights[idx] > 0);
        }
    }
}
