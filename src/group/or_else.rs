//! `orElse` endpoint group: falls back to a secondary group whenever the
//! primary is empty (spec.md §4.2 "orElse").

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::observability::Observability;

use super::{EndpointGroup, GroupCore, ListenerFn, ListenerId, Snapshot};

/// Snapshot = `primary.endpoints()` if non-empty, else `fallback.endpoints()`.
/// Listener events from either child trigger a recompute; a transition
/// from "showing fallback" to "showing primary" (or vice versa) republishes
/// like any other snapshot change.
pub struct OrElseGroup {
    primary: Arc<dyn EndpointGroup>,
    fallback: Arc<dyn EndpointGroup>,
    core: GroupCore,
}

impl OrElseGroup {
    pub fn new(primary: Arc<dyn EndpointGroup>, fallback: Arc<dyn EndpointGroup>) -> Arc<dyn EndpointGroup> {
        Self::with_observability(primary, fallback, Observability::default())
    }

    pub fn with_observability(
        primary: Arc<dyn EndpointGroup>,
        fallback: Arc<dyn EndpointGroup>,
        observability: Observability,
    ) -> Arc<dyn EndpointGroup> {
        let this = Arc::new(Self {
            primary,
            fallback,
            core: GroupCore::new(true, observability),
        });

        for child in [&this.primary, &this.fallback] {
            let weak: Weak<OrElseGroup> = Arc::downgrade(&this);
            child.add_listener(
                Arc::new(move |_snapshot| {
                    if let Some(strong) = weak.upgrade() {
                        strong.recompute();
                    }
                }),
                false,
            );
        }
        this.recompute();
        this
    }

    fn recompute(&self) {
        let primary_snapshot = self.primary.endpoints();
        let chosen = if primary_snapshot.is_empty() {
            self.fallback.endpoints()
        } else {
            primary_snapshot
        };
        self.core.publish((*chosen).clone());
    }

    /// Sets the default selection timeout a selector over this group falls
    /// back to when a caller doesn't pass one explicitly.
    pub fn set_selection_timeout(&self, timeout: impl Into<Option<Duration>>) {
        self.core.set_selection_timeout(timeout.into());
    }
}

impl EndpointGroup for OrElseGroup {
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
