//! `EndpointSelector`: the asynchronous pick operation every concrete
//! strategy shares (spec.md §4.4, §4.5).
//!
//! One base type handles the pending-future queue, group-change wake-ups,
//! and per-request timeout; the strategy-specific behavior is entirely
//! captured by the `Arc<dyn StrategyIndex>` it rebuilds on every group
//! update (spec.md §9 "Avoid deep hierarchies").

mod pending;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::endpoint::Endpoint;
use crate::error::{FleetError, Result};
use crate::group::{EndpointGroup, ListenerId};
use crate::strategy::{SelectionKey, SelectionStrategy, StrategyIndex};

use pending::{PendingEntry, PendingQueue};

/// How often the ramping-up strategy's periodic ticker recomputes
/// effective weights when the group itself is otherwise quiet (spec.md
/// §4.5.3 "driven by a periodic ticker").
const RAMPING_UP_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Asynchronous pick operation over one [`EndpointGroup`] under one
/// [`SelectionStrategy`] (spec.md §4.4/§4.5). Registers itself as a group
/// listener at construction and unregisters on drop.
pub struct EndpointSelector {
    group: Arc<dyn EndpointGroup>,
    strategy: SelectionStrategy,
    index: Mutex<Arc<dyn StrategyIndex>>,
    /// Serializes rebuilds so at most one is in flight per selector
    /// (spec.md §3 invariant); the heavy work (sorting a ring, filling a
    /// cumulative table) happens under this lock but never under
    /// `group`'s own internal lock, matching the "never call user code
    /// while holding an internal lock" discipline (spec.md §5) — nothing
    /// here is user code.
    rebuild_lock: StdMutex<()>,
    pending: Mutex<PendingQueue>,
    next_id: AtomicU64,
    listener_id: OnceLock<ListenerId>,
    ticker: StdMutex<Option<JoinHandle<()>>>,
}

impl EndpointSelector {
    /// Builds a selector over `group` under `strategy`. The first index
    /// build happens synchronously against the group's current snapshot.
    pub fn new(group: Arc<dyn EndpointGroup>, strategy: SelectionStrategy) -> Arc<Self> {
        let initial_index = strategy.build(&group.endpoints());
        let is_stateful = strategy.is_stateful();

        let this = Arc::new(Self {
            group: group.clone(),
            strategy,
            index: Mutex::new(initial_index),
            rebuild_lock: StdMutex::new(()),
            pending: Mutex::new(PendingQueue::default()),
            next_id: AtomicU64::new(0),
            listener_id: OnceLock::new(),
            ticker: StdMutex::new(None),
        });

        let weak = Arc::downgrade(&this);
        let listener_id = group.add_listener(
            Arc::new(move |snapshot| {
                if let Some(strong) = weak.upgrade() {
                    strong.on_group_update(snapshot);
                }
            }),
            false,
        );
        this.listener_id.set(listener_id).expect("set exactly once during new()");

        if is_stateful {
            let weak = Arc::downgrade(&this);
            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(RAMPING_UP_TICK_INTERVAL);
                loop {
                    interval.tick().await;
                    let Some(strong) = weak.upgrade() else {
                        return;
                    };
                    let snapshot = strong.group.endpoints();
                    strong.on_group_update(&snapshot);
                }
            });
            *this.ticker.lock().unwrap() = Some(handle);
        }

        this
    }

    /// Non-blocking pick against the current snapshot. Returns `None` only
    /// when no candidate is currently selectable (empty group, or every
    /// endpoint filtered by the strategy) (spec.md §4.4).
    pub fn select_now(&self, key: SelectionKey) -> Option<Endpoint> {
        self.index.lock().pick(key)
    }

    /// Selects now if possible; otherwise parks until a group update
    /// satisfies the request or `timeout` elapses, resolving to `None` on
    /// timeout (spec.md §4.4 "returns null on timeout" variant).
    ///
    /// `timeout` accepts a bare `Duration` or `None`; passing `None` falls
    /// back to the group's configured `selectionTimeoutMillis` default
    /// (spec.md §4.2), and panics if the group has none either.
    pub async fn select_or_timeout(&self, key: SelectionKey, timeout: impl Into<Option<Duration>>) -> Option<Endpoint> {
        let timeout = self.resolve_timeout(timeout.into());
        match self.select_or_fail_inner(key, timeout).await {
            Ok(endpoint) => Some(endpoint),
            Err(_) => None,
        }
    }

    /// Same as [`EndpointSelector::select_or_timeout`] but resolves the
    /// timeout case to `Err(FleetError::SelectionTimeout)` instead of
    /// `None` (spec.md §4.4 "fails with SelectionTimeoutException" variant;
    /// §9 Open Question — both are kept as explicit operations).
    pub async fn select_or_fail(&self, key: SelectionKey, timeout: impl Into<Option<Duration>>) -> Result<Endpoint> {
        let timeout = self.resolve_timeout(timeout.into());
        self.select_or_fail_inner(key, timeout).await
    }

    /// Resolves an optional caller-supplied timeout against the group's
    /// default (spec.md §4.2 `selectionTimeoutMillis`). Panics if neither is
    /// present — a caller must supply one or the other.
    fn resolve_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.or_else(|| self.group.selection_timeout()).expect(
            "select_or_timeout/select_or_fail need an explicit timeout when the group has no configured selection_timeout default",
        )
    }

    async fn select_or_fail_inner(&self, key: SelectionKey, timeout: Duration) -> Result<Endpoint> {
        if let Some(endpoint) = self.select_now(key) {
            return Ok(endpoint);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push(id, PendingEntry { key, sender: tx });

        struct CancelGuard<'a> {
            selector: &'a EndpointSelector,
            id: u64,
            armed: bool,
        }
        impl Drop for CancelGuard<'_> {
            fn drop(&mut self) {
                if self.armed {
                    self.selector.pending.lock().remove(self.id);
                }
            }
        }
        let mut guard = CancelGuard {
            selector: self,
            id,
            armed: true,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(endpoint)) => {
                guard.armed = false;
                Ok(endpoint)
            }
            Ok(Err(_)) => {
                guard.armed = false;
                Err(FleetError::SelectionTimeout(timeout.as_millis() as u64))
            }
            Err(_elapsed) => {
                // If a group update satisfied this waiter in the narrow
                // window between the deadline firing and us taking the
                // lock, `remove` here is a no-op (drain_satisfiable beat
                // us to it) and the value it sent is lost to us — this
                // still surfaces as a timeout rather than double-polling
                // an already-consumed receiver.
                self.pending.lock().remove(id);
                guard.armed = false;
                Err(FleetError::SelectionTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Count of selections currently parked, observable for test
    /// assertions (spec.md §4.4 `pendingFutures()`).
    pub fn pending_futures(&self) -> usize {
        self.pending.lock().len()
    }

    fn on_group_update(&self, snapshot: &[Endpoint]) {
        let _rebuild_guard = self.rebuild_lock.lock().unwrap();
        if self.strategy.is_stateful() {
            self.index.lock().rebuild_in_place(snapshot);
        } else {
            let fresh = self.strategy.build(snapshot);
            *self.index.lock() = fresh;
        }
        drop(_rebuild_guard);

        let index = self.index.lock().clone();
        self.pending.lock().drain_satisfiable(|key| index.pick(key));
    }
}

impl Drop for EndpointSelector {
    fn drop(&mut self) {
        if let Some(&id) = self.listener_id.get() {
            self.group.remove_listener(id);
        }
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::DynamicGroup;
    use crate::strategy::SelectionStrategy;
    use std::time::Duration;

    fn ep(host: &str) -> Endpoint {
        Endpoint::parse(host).unwrap()
    }

    #[test]
    fn select_now_returns_none_on_empty_group() {
        let group = Arc::new(DynamicGroup::new(true));
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());
        assert!(selector.select_now(SelectionKey::from_u64(0)).is_none());
    }

    #[test]
    fn select_now_returns_the_only_endpoint_in_a_singleton_group() {
        let group = Arc::new(DynamicGroup::new(true));
        group.set_endpoints(vec![ep("a:1")]);
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());
        assert_eq!(
            selector.select_now(SelectionKey::from_u64(0)).unwrap().authority(),
            "a:1"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn parks_then_resolves_all_waiters_on_first_publish() {
        let group = Arc::new(DynamicGroup::new(true));
        let selector = EndpointSelector::new(group.clone(), SelectionStrategy::round_robin());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let selector = selector.clone();
            handles.push(tokio::spawn(async move {
                selector.select_or_timeout(SelectionKey::from_u64(0), Duration::from_secs(5)).await
            }));
        }

        // Give every task a chance to park before publishing.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(selector.pending_futures(), 10);

        group.set_endpoints(vec![ep("a:1")]);

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().authority(), "a:1");
        }
        assert_eq!(selector.pending_futures(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_or_timeout_resolves_none_after_deadline() {
        let group = Arc::new(DynamicGroup::new(true));
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());

        let result = selector
            .select_or_timeout(SelectionKey::from_u64(0), Duration::from_millis(50))
            .await;
        assert!(result.is_none());
        assert_eq!(selector.pending_futures(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_or_fail_fails_with_selection_timeout() {
        let group = Arc::new(DynamicGroup::new(true));
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());

        let result = selector
            .select_or_fail(SelectionKey::from_u64(0), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(FleetError::SelectionTimeout(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_or_timeout_falls_back_to_the_groups_configured_default() {
        let group = Arc::new(DynamicGroup::new(true));
        group.set_selection_timeout(Duration::from_millis(50));
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());

        let result = selector.select_or_timeout(SelectionKey::from_u64(0), None).await;
        assert!(result.is_none());
        assert_eq!(selector.pending_futures(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[should_panic(expected = "need an explicit timeout")]
    async fn select_or_timeout_panics_without_a_timeout_or_group_default() {
        let group = Arc::new(DynamicGroup::new(true));
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());
        selector.select_or_timeout(SelectionKey::from_u64(0), None).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_selection_is_removed_from_the_pending_queue() {
        let group = Arc::new(DynamicGroup::new(true));
        let selector = EndpointSelector::new(group, SelectionStrategy::round_robin());

        let selector_clone = selector.clone();
        let handle = tokio::spawn(async move {
            selector_clone.select_or_timeout(SelectionKey::from_u64(0), Duration::from_secs(30)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(selector.pending_futures(), 1);

        handle.abort();
        let _ = handle.await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(selector.pending_futures(), 0);
    }
}
