//! Composite endpoint group: the union of a fixed set of child groups
//! (spec.md §4.2 "composite", `EndpointGroup.of(strategy, groups...)").

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::observability::Observability;

use super::{EndpointGroup, GroupCore, ListenerFn, ListenerId, Snapshot};

/// Snapshot = concatenation of every child's current snapshot, in child
/// order, duplicates preserved exactly as produced (spec.md §4.2). Recomputes
/// and republishes (subject to the usual no-op-on-equal-multiset rule)
/// whenever any child fires. `when_ready` completes on whichever child
/// produces the first snapshot that makes the union's own publish fire —
/// i.e. the first non-empty union, not "every child has published" (spec.md
/// §8 S7).
pub struct CompositeGroup {
    children: Vec<Arc<dyn EndpointGroup>>,
    core: GroupCore,
}

impl CompositeGroup {
    /// Builds the composite and wires up child listeners. Returned as an
    /// `Arc` because the child listener closures need a weak handle back
    /// to `self` to recompute the union without creating a strong
    /// reference cycle (spec.md §9 "Cyclic structure").
    pub fn new(children: Vec<Arc<dyn EndpointGroup>>) -> Arc<Self> {
        Self::with_observability(children, Observability::default())
    }

    pub fn with_observability(children: Vec<Arc<dyn EndpointGroup>>, observability: Observability) -> Arc<Self> {
        let this = Arc::new(Self {
            children,
            core: GroupCore::new(true, observability),
        });

        for child in &this.children {
            let weak: Weak<CompositeGroup> = Arc::downgrade(&this);
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
        let mut union = Vec::new();
        for child in &self.children {
            union.extend((*child.endpoints()).clone());
        }
        self.core.publish(union);
    }

    /// Sets the default selection timeout a selector over this group falls
    /// back to when a caller doesn't pass one explicitly.
    pub fn set_selection_timeout(&self, timeout: impl Into<Option<Duration>>) {
        self.core.set_selection_timeout(timeout.into());
    }
}

impl EndpointGroup for CompositeGroup {
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
