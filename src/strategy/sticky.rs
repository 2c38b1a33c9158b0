//! Sticky hash (spec.md §4.5.5).
//!
//! The simplest strategy: a flat list of endpoints, `|hash(key)| mod n`
//! picks the entry. Not consistent under membership change — every
//! addition/removal can reshuffle the whole mapping — but trivial to
//! build, which is the point.

use crate::endpoint::Endpoint;
use crate::strategy::index::{SelectionKey, StrategyIndex};

pub(crate) struct StickyIndex {
    endpoints: Vec<Endpoint>,
}

impl StickyIndex {
    pub(crate) fn build(snapshot: &[Endpoint]) -> Self {
        Self {
            endpoints: snapshot.iter().filter(|e| e.weight() > 0).cloned().collect(),
        }
    }
}

impl StrategyIndex for StickyIndex {
    fn pick(&self, key: SelectionKey) -> Option<Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = (key.value() as usize) % self.endpoints.len();
        self.endpoints.get(idx).cloned()
    }
}
