//! Dynamic endpoint group: accepts `set_endpoints`/`add_endpoint`/`remove_endpoint`
//! (spec.md §4.2 "dynamic").

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::observability::Observability;

use super::{EndpointGroup, GroupCore, ListenerFn, ListenerId, Snapshot};

/// Caller-driven collection. `allow_empty_endpoints` governs whether
/// `set_endpoints(vec![])` actually clears the group or is silently
/// ignored (spec.md §3): when `false`, the previous non-empty snapshot is
/// retained.
pub struct DynamicGroup {
    core: GroupCore,
}

impl DynamicGroup {
    pub fn new(allow_empty_endpoints: bool) -> Self {
        Self::with_observability(allow_empty_endpoints, Observability::default())
    }

    pub fn with_observability(allow_empty_endpoints: bool, observability: Observability) -> Self {
        Self {
            core: GroupCore::new(allow_empty_endpoints, observability),
        }
    }

    /// Replaces the current snapshot atomically. Publishes iff the new set
    /// is structurally unequal to the current one (order-independent,
    /// weight-inclusive multiset comparison); a no-op if the group
    /// disallows empty snapshots and `endpoints` is empty.
    ///
    /// Returns `true` iff a new snapshot was installed.
    pub fn set_endpoints(&self, endpoints: Vec<Endpoint>) -> bool {
        self.core.publish(endpoints)
    }

    /// Convenience over [`DynamicGroup::set_endpoints`]: appends `endpoint`
    /// to the current snapshot. Duplicates are preserved, matching
    /// `endpoints()`'s "may contain duplicates only if explicitly
    /// constructed" invariant (spec.md §3).
    pub fn add_endpoint(&self, endpoint: Endpoint) -> bool {
        let mut endpoints = (*self.core.endpoints()).clone();
        endpoints.push(endpoint);
        self.set_endpoints(endpoints)
    }

    /// Convenience over [`DynamicGroup::set_endpoints`]: removes every
    /// structural match of `endpoint` from the current snapshot.
    pub fn remove_endpoint(&self, endpoint: &Endpoint) -> bool {
        let mut endpoints = (*self.core.endpoints()).clone();
        endpoints.retain(|e| e != endpoint);
        self.set_endpoints(endpoints)
    }

    /// Sets the default selection timeout a selector over this group falls
    /// back to when a caller doesn't pass one explicitly.
    pub fn set_selection_timeout(&self, timeout: impl Into<Option<Duration>>) {
        self.core.set_selection_timeout(timeout.into());
    }
}

impl EndpointGroup for DynamicGroup {
    fn endpoints(&self) -> Snapshot {
        self.core.endpoints()
    }

    fn add_listener(&self, listener: ListenerFn, notify_latest: bool) -> ListenerId {
        self.core.add_listener(listener, notify_latest)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.core.remove_listener(id)
    }

    fn when_ready(&self) -> Pin<Box<dyn Future<Output = Snapshot> + Send + '_>> {
        self.core.when_ready()
    }

    fn selection_timeout(&self) -> Option<Duration> {
        self.core.selection_timeout()
    }
}
