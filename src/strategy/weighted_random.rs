//! Weighted random distribution (spec.md §4.5.2).
//!
//! Each "turn" draws a uniform integer over the remaining weight and maps
//! it to an entry; once an entry has been picked `weight` times in the
//! turn it's marked full and excluded from subsequent draws. When every
//! entry is full, a single winner resets all counters atomically and a
//! new turn begins. Each full turn picks every endpoint exactly
//! `weight(e)` times; the order within a turn is unspecified.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use rand::Rng;

use crate::endpoint::Endpoint;
use crate::strategy::index::{nonzero_weighted, SelectionKey, StrategyIndex};

struct Entry {
    endpoint: Endpoint,
    weight: u32,
    picked_this_turn: AtomicU32,
}

pub(crate) struct WeightedRandomIndex {
    entries: Vec<Entry>,
    total_weight: u64,
    /// Set once every entry has reached its quota; the thread that flips
    /// it `false -> true`... no — flips `true` back to all-reset is the
    /// single winner of a CAS race, guaranteeing exactly one reset per
    /// turn boundary even under concurrent pickers.
    resetting: AtomicBool,
}

impl WeightedRandomIndex {
    pub(crate) fn build(snapshot: &[Endpoint]) -> Self {
        let (endpoints, total_weight) = nonzero_weighted(snapshot);
        let entries = endpoints
            .into_iter()
            .map(|endpoint| {
                let weight = endpoint.weight();
                Entry {
                    endpoint,
                    weight,
                    picked_this_turn: AtomicU32::new(0),
                }
            })
            .collect();
        Self {
            entries,
            total_weight,
            resetting: AtomicBool::new(false),
        }
    }

    fn remaining_weight(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| {
                let picked = e.picked_this_turn.load(Ordering::Acquire);
                (e.weight.saturating_sub(picked)) as u64
            })
            .sum()
    }

    fn reset_turn(&self) {
        // Only one thread performs the reset per turn boundary; everyone
        // else simply retries their draw against the freshly-reset state.
        if self
            .resetting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            for entry in &self.entries {
                entry.picked_this_turn.store(0, Ordering::Release);
            }
            self.resetting.store(false, Ordering::Release);
        }
    }
}

impl StrategyIndex for WeightedRandomIndex {
    fn pick(&self, _key: SelectionKey) -> Option<Endpoint> {
        if self.total_weight == 0 || self.entries.is_empty() {
            return None;
        }
        // Each failed draw either hits a momentarily-full entry (another
        // picker's race) or triggers a turn reset; the loop always makes
        // progress because `remaining_weight` only reaches 0 once per turn,
        // immediately followed by a reset, so it always terminates in a
        // pick rather than giving up.
        loop {
            let remaining = self.remaining_weight();
            if remaining == 0 {
                self.reset_turn();
                continue;
            }
            let mut draw = rand::thread_rng().gen_range(0..remaining);
            for entry in &self.entries {
                let picked = entry.picked_this_turn.load(Ordering::Acquire);
                let left = (entry.weight.saturating_sub(picked)) as u64;
                if left == 0 {
                    continue;
                }
                if draw < left {
                    let prior = entry.picked_this_turn.fetch_add(1, Ordering::AcqRel);
                    if prior < entry.weight {
                        return Some(entry.endpoint.clone());
                    }
                    // Lost a race against another picker that already
                    // filled this entry; undo and retry the draw.
                    entry.picked_this_turn.fetch_sub(1, Ordering::AcqRel);
                    break;
                }
                draw -= left;
            }
        }
    }
}
