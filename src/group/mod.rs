//! `EndpointGroup`: an observable collection of endpoints (spec.md §4.2).
//!
//! [`GroupCore`] is the shared publish/listener/readiness machinery every
//! variant embeds; the variants differ only in *how* a new snapshot gets
//! computed (frozen at construction, caller-driven, derived from children,
//! or derived from a watched file). Publication always follows the same
//! protocol: diff under a lock, install, release the lock, then invoke
//! listeners with no lock held (spec.md §4.2 Publish protocol).

mod composite;
mod dynamic;
mod file_watched;
mod or_else;
mod static_group;

pub use composite::CompositeGroup;
pub use dynamic::DynamicGroup;
pub use file_watched::{parse_endpoint_file, FileWatchedGroup};
pub use or_else::OrElseGroup;
pub use static_group::StaticGroup;

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::endpoint::Endpoint;
use crate::observability::Observability;

/// An immutable point-in-time view of a group's endpoints. Stable by
/// pointer identity across `endpoints()` calls until the next accepted
/// publication (spec.md §8 invariant 1) — callers may use `Arc::ptr_eq` as
/// a cheap "nothing changed" short-circuit.
pub type Snapshot = Arc<Vec<Endpoint>>;

/// Handle returned by [`EndpointGroup::add_listener`], opaque beyond
/// equality, used to unregister later.
pub type ListenerId = u64;

/// A group-change callback: `Arc`-wrapped so the same listener can be
/// cloned into multiple internal bookkeeping structures cheaply.
pub type ListenerFn = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Observable endpoint collection. Object-safe so groups can be composed
/// and stored as `Arc<dyn EndpointGroup>` regardless of concrete variant.
pub trait EndpointGroup: Send + Sync + 'static {
    /// Current snapshot. O(1): an `Arc` clone of whatever was last
    /// published.
    fn endpoints(&self) -> Snapshot;

    /// Registers a listener, invoked exactly once per distinct accepted
    /// snapshot transition, in registration order. If `notify_latest` and a
    /// snapshot has already been published, the listener is also invoked
    /// synchronously with the current snapshot before this call returns.
    fn add_listener(&self, listener: ListenerFn, notify_latest: bool) -> ListenerId;

    /// Unregisters a listener. Unknown ids are silently ignored — matches
    /// the idempotent-unregistration behavior `FileWatcher` also needs.
    fn remove_listener(&self, id: ListenerId);

    /// Resolves with the first accepted snapshot: the first non-empty one
    /// normally, or the very first one if the group allows publishing
    /// empty snapshots (spec.md §3).
    fn when_ready(&self) -> Pin<Box<dyn Future<Output = Snapshot> + Send + '_>>;

    /// Default per-selection wait cap a selector built over this group
    /// should use when the caller doesn't override it. `None` means "no
    /// group-level default" — the selector call must supply its own.
    fn selection_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Extension methods that need `Arc<dyn EndpointGroup>` rather than `&self`
/// (spec.md §4.2 `orElse`); kept off the base trait so it stays usable as a
/// plain trait object.
pub trait EndpointGroupExt {
    fn or_else(self, fallback: Arc<dyn EndpointGroup>) -> Arc<dyn EndpointGroup>;
}

impl EndpointGroupExt for Arc<dyn EndpointGroup> {
    fn or_else(self, fallback: Arc<dyn EndpointGroup>) -> Arc<dyn EndpointGroup> {
        OrElseGroup::new(self, fallback)
    }
}

/// Shared publish/listener/readiness state. Every concrete group variant
/// embeds one and delegates the trait methods to it; variants that derive
/// their snapshot from other groups (composite, orElse) call
/// [`GroupCore::publish`] from a recompute routine triggered by a child
/// listener instead of from a public `set_endpoints`.
pub(crate) struct GroupCore {
    snapshot: parking_lot::RwLock<Snapshot>,
    allow_empty_endpoints: bool,
    /// Whether `publish` has ever installed a snapshot, tracked separately
    /// from the snapshot's own content. The snapshot starts as an empty
    /// `Vec`, so without this flag an allow-empty group's very first
    /// `publish(vec![])` would `same_multiset`-match that synthetic
    /// starting state and be treated as a no-op duplicate — dropping the
    /// one publication `when_ready()` is waiting on (spec.md §3 "the first
    /// snapshot if the group permits empty").
    published: AtomicBool,
    selection_timeout: Mutex<Option<Duration>>,
    listeners: Mutex<Vec<(ListenerId, ListenerFn)>>,
    next_listener_id: AtomicU64,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    observability: Observability,
}

impl GroupCore {
    pub(crate) fn new(allow_empty_endpoints: bool, observability: Observability) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            snapshot: parking_lot::RwLock::new(Arc::new(Vec::new())),
            allow_empty_endpoints,
            published: AtomicBool::new(false),
            selection_timeout: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            ready_tx,
            ready_rx,
            observability,
        }
    }

    /// Sets the group-level default a selector built over this group
    /// falls back to when a caller doesn't pass an explicit timeout
    /// (spec.md §4.2 `selectionTimeoutMillis`). Settable through `&self` so
    /// it can be configured after construction, including through an `Arc`.
    pub(crate) fn set_selection_timeout(&self, timeout: Option<Duration>) {
        *self.selection_timeout.lock() = timeout;
    }

    pub(crate) fn endpoints(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    pub(crate) fn selection_timeout(&self) -> Option<Duration> {
        *self.selection_timeout.lock()
    }

    /// Applies the publish protocol: reject per `allow_empty_endpoints`,
    /// diff by weight-inclusive multiset comparison against the
    /// previously *published* snapshot (not merely the current in-memory
    /// one, which starts as an empty `Vec` before anything is published),
    /// install, then notify outside the lock. Returns `true` iff a new
    /// snapshot was installed.
    pub(crate) fn publish(&self, new_endpoints: Vec<Endpoint>) -> bool {
        if !self.allow_empty_endpoints && new_endpoints.is_empty() {
            return false;
        }
        let new_snapshot = {
            let current = self.snapshot.read();
            if self.published.load(Ordering::Acquire) && same_multiset(&current, &new_endpoints) {
                return false;
            }
            Arc::new(new_endpoints)
        };
        {
            let mut guard = self.snapshot.write();
            *guard = new_snapshot.clone();
        }
        self.published.store(true, Ordering::Release);
        let _ = self.ready_tx.send(true);
        self.notify_listeners(&new_snapshot);
        true
    }

    fn notify_listeners(&self, snapshot: &Snapshot) {
        let listeners: Vec<ListenerFn> = self.listeners.lock().iter().map(|(_, f)| f.clone()).collect();
        for listener in listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(snapshot)));
            if outcome.is_err() {
                self.observability.warn("group", "listener panicked while handling a snapshot update");
            }
        }
    }

    pub(crate) fn add_listener(&self, listener: ListenerFn, notify_latest: bool) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener.clone()));
        if notify_latest {
            let snapshot = self.endpoints();
            if self.published.load(Ordering::Acquire) && (!snapshot.is_empty() || self.allow_empty_endpoints) {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&snapshot)));
                if outcome.is_err() {
                    self.observability.warn("group", "listener panicked during notify_latest replay");
                }
            }
        }
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn when_ready(&self) -> Pin<Box<dyn Future<Output = Snapshot> + Send + '_>> {
        Box::pin(async move {
            let mut rx = self.ready_rx.clone();
            loop {
                if *rx.borrow() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
            self.endpoints()
        })
    }
}

/// Weight-inclusive, order-independent equality (spec.md §4.2
/// `setEndpoints`): two snapshots are the same update iff they contain the
/// same endpoints the same number of times, weight included.
fn same_multiset(a: &[Endpoint], b: &[Endpoint]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut ak: Vec<_> = a.iter().map(multiset_key).collect();
    let mut bk: Vec<_> = b.iter().map(multiset_key).collect();
    ak.sort();
    bk.sort();
    ak == bk
}

fn multiset_key(e: &Endpoint) -> (String, Option<IpAddr>, u16, u32) {
    (e.host(), e.ip_addr(), e.port(), e.weight())
}
