//! Weighted round robin (spec.md §4.5.1).
//!
//! Built once per rebuild: a cumulative-weight table plus a global
//! counter. `pick` takes `counter.fetch_add(1) mod total_weight` and
//! binary-searches the table — over any window of `total_weight`
//! consecutive picks against a stable index, each endpoint appears
//! exactly `weight(e)` times, stable by most-recent input order.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::endpoint::Endpoint;
use crate::strategy::index::{nonzero_weighted, SelectionKey, StrategyIndex};

pub(crate) struct WrrIndex {
    endpoints: Vec<Endpoint>,
    /// `cumulative[i]` is the exclusive upper bound of the weight range
    /// owned by `endpoints[i]`; `cumulative.last() == Some(&total_weight)`.
    cumulative: Vec<u64>,
    total_weight: u64,
    counter: AtomicU64,
}

impl WrrIndex {
    pub(crate) fn build(snapshot: &[Endpoint]) -> Self {
        let (endpoints, total_weight) = nonzero_weighted(snapshot);
        let mut running = 0u64;
        let cumulative = endpoints
            .iter()
            .map(|e| {
                running += e.weight() as u64;
                running
            })
            .collect();
        Self {
            endpoints,
            cumulative,
            total_weight,
            counter: AtomicU64::new(0),
        }
    }
}

impl StrategyIndex for WrrIndex {
    fn pick(&self, _key: SelectionKey) -> Option<Endpoint> {
        if self.total_weight == 0 {
            return None;
        }
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed) % self.total_weight;
        let idx = match self.cumulative.binary_search(&ticket) {
            Ok(exact) => exact + 1, // `ticket` equals a boundary, owned by the next range
            Err(insert_at) => insert_at,
        };
        self.endpoints.get(idx).cloned()
    }
}
