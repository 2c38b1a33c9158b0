//! Static endpoint group: frozen at construction (spec.md §4.2 "static").

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::observability::Observability;

use super::{EndpointGroup, GroupCore, ListenerFn, ListenerId, Snapshot};

/// Allows its own snapshot to be empty regardless of caller intent — there
/// is no `set_endpoints` to retry, so rejecting an empty construction would
/// just make the group unconstructible.
pub struct StaticGroup {
    core: GroupCore,
}

impl StaticGroup {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self::with_observability(endpoints, Observability::default())
    }

    pub fn with_observability(endpoints: Vec<Endpoint>, observability: Observability) -> Self {
        let core = GroupCore::new(true, observability);
        core.publish(endpoints);
        Self { core }
    }

    /// Sets the default selection timeout a selector over this group falls
    /// back to when a caller doesn't pass one explicitly.
    pub fn set_selection_timeout(&self, timeout: impl Into<Option<Duration>>) {
        self.core.set_selection_timeout(timeout.into());
    }
}

impl EndpointGroup for StaticGroup {
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
