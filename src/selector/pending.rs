//! FIFO of pending selections awaiting a group update that can satisfy
//! them (spec.md §4.4). Entries are keyed by a monotonically-increasing
//! id assigned under the same lock as insertion, so key order is arrival
//! order; a `BTreeMap` gives both the ordered front-to-back walk
//! `drain_satisfiable` needs and O(log n) point removal for cancellation/
//! timeout, instead of the O(n) scan a separate `VecDeque` order-list
//! plus `retain` would need (spec.md §4.4 "removal must be O(log n) or
//! amortized O(1)").

use std::collections::BTreeMap;

use tokio::sync::oneshot;

use crate::endpoint::Endpoint;
use crate::strategy::SelectionKey;

pub(super) struct PendingEntry {
    pub(super) key: SelectionKey,
    pub(super) sender: oneshot::Sender<Endpoint>,
}

#[derive(Default)]
pub(super) struct PendingQueue {
    entries: BTreeMap<u64, PendingEntry>,
}

impl PendingQueue {
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn push(&mut self, id: u64, entry: PendingEntry) {
        self.entries.insert(id, entry);
    }

    /// Removes one entry by id, used by cancellation and timeout paths.
    /// Returns it so the caller can decide what, if anything, to do with
    /// the still-unused sender.
    pub(super) fn remove(&mut self, id: u64) -> Option<PendingEntry> {
        self.entries.remove(&id)
    }

    /// Drains from the front, completing every waiter `pick` can satisfy
    /// against the new index, stopping at the first one it can't (spec.md
    /// §5 ordering guarantee).
    pub(super) fn drain_satisfiable(&mut self, mut pick: impl FnMut(SelectionKey) -> Option<Endpoint>) {
        while let Some(&id) = self.entries.keys().next() {
            let key = self.entries.get(&id).expect("id just observed at the front").key;
            match pick(key) {
                Some(endpoint) => {
                    let entry = self.entries.remove(&id).expect("id just observed at the front");
                    let _ = entry.sender.send(endpoint);
                }
                None => break,
            }
        }
    }
}
