//! The object-safe seam every concrete strategy implements: a stateless
//! (or internally-synchronized) picker built from one endpoint snapshot.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::endpoint::Endpoint;

/// A caller-derived selection key. Ring-hash and sticky-hash strategies
/// consult it; round-robin style strategies ignore it entirely. Kept as a
/// pre-hashed `u64` rather than a borrowed request type so this crate
/// never has to know anything about the caller's protocol (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectionKey(u64);

impl SelectionKey {
    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Convenience: hashes arbitrary bytes with the standard library's
    /// default (SipHash) hasher. Good enough for sticky/ring-hash
    /// purposes; callers with stricter distribution requirements should
    /// hash their own key and use [`SelectionKey::from_u64`] instead.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Self(hasher.finish())
    }

    pub(crate) fn value(self) -> u64 {
        self.0
    }
}

/// Named hash functions a sticky-hash strategy can be configured with
/// (spec.md §6: "sticky accepts a hasher name"). The selection-key
/// abstraction keeps the actual request inspection on the caller's side
/// (SPEC_FULL.md §4), so this only governs how [`SelectionKey::hashed`]
/// turns raw bytes into the `u64` the strategies consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasherKind {
    /// The standard library's SipHash, via [`SelectionKey::from_bytes`].
    Default,
    /// FNV-1a: faster, non-cryptographic, fine for load distribution.
    Fnv1a,
}

impl SelectionKey {
    /// Hashes `bytes` with the named function.
    pub fn hashed(kind: HasherKind, bytes: &[u8]) -> Self {
        match kind {
            HasherKind::Default => Self::from_bytes(bytes),
            HasherKind::Fnv1a => Self(fnv1a(bytes)),
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Built by a [`crate::strategy::SelectionStrategy`] from one snapshot and
/// consulted once per request via [`StrategyIndex::pick`]. Rebuilds happen
/// off the selection hot path (spec.md §4.5): the heavy work of sorting a
/// ring or filling a cumulative-weight table happens once, on whichever
/// thread observed the group change, before the result is published.
pub trait StrategyIndex: Send + Sync {
    /// Returns `None` only when every candidate is filtered out (e.g. an
    /// empty snapshot, or every endpoint carries weight `0`).
    fn pick(&self, key: SelectionKey) -> Option<Endpoint>;

    /// Hook for indexes that carry state across rebuilds (currently only
    /// ramping-up). Stateless indexes never override this; the selector
    /// instead replaces the whole `Arc<dyn StrategyIndex>` on every group
    /// change.
    fn rebuild_in_place(&self, _snapshot: &[Endpoint]) {}
}

/// Filters out zero-weight endpoints and returns the total remaining
/// weight, shared by WRR and weighted-random construction.
pub(crate) fn nonzero_weighted(snapshot: &[Endpoint]) -> (Vec<Endpoint>, u64) {
    let mut total = 0u64;
    let mut entries = Vec::with_capacity(snapshot.len());
    for endpoint in snapshot {
        if endpoint.weight() > 0 {
            total += endpoint.weight() as u64;
            entries.push(endpoint.clone());
        }
    }
    (entries, total)
}
