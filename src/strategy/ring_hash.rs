//! Consistent ring hash (spec.md §4.5.4).
//!
//! Builds a sorted `u64 -> Endpoint` ring sized roughly proportional to
//! total weight (capped at `max_ring_size`): each endpoint contributes
//! `scaled_weight` virtual nodes hashed as `"host:port#i"`. A pick hashes
//! the caller's key and walks to the smallest ring entry `>= h`, wrapping
//! around — so the same key maps to the same endpoint for as long as the
//! ring is unchanged, and adding/removing one endpoint of weight `w`
//! invalidates roughly `w / total` of keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::endpoint::Endpoint;
use crate::strategy::index::{SelectionKey, StrategyIndex};

pub(crate) struct RingHashIndex {
    ring: Vec<(u64, Endpoint)>,
}

fn hash_vnode(authority: &str, vnode: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    authority.hash(&mut hasher);
    b'#'.hash(&mut hasher);
    vnode.hash(&mut hasher);
    hasher.finish()
}

impl RingHashIndex {
    pub(crate) fn build(snapshot: &[Endpoint], max_ring_size: u32) -> Self {
        let total_weight: u64 = snapshot.iter().map(|e| e.weight() as u64).sum();
        if total_weight == 0 {
            return Self { ring: Vec::new() };
        }

        let mut candidates: Vec<&Endpoint> = snapshot.iter().filter(|e| e.weight() > 0).collect();
        // Deterministic ordering breaks ties when two vnodes hash equal.
        candidates.sort_by_key(|e| e.authority());

        let mut ring = Vec::new();
        for endpoint in candidates {
            let share = (endpoint.weight() as u128 * max_ring_size as u128) / total_weight as u128;
            let vnodes = share.max(1) as u32;
            let authority = endpoint.authority();
            for i in 0..vnodes {
                ring.push((hash_vnode(&authority, i), endpoint.clone()));
            }
        }
        ring.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.authority().cmp(&b.1.authority())));
        Self { ring }
    }
}

impl StrategyIndex for RingHashIndex {
    fn pick(&self, key: SelectionKey) -> Option<Endpoint> {
        if self.ring.is_empty() {
            return None;
        }
        let h = key.value();
        match self.ring.binary_search_by(|(k, _)| k.cmp(&h)) {
            Ok(idx) => Some(self.ring[idx].1.clone()),
            Err(idx) if idx < self.ring.len() => Some(self.ring[idx].1.clone()),
            Err(_) => Some(self.ring[0].1.clone()), // wrap around
        }
    }
}
