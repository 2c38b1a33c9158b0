//! `ConcurrencyLimit`: a permit broker bounding in-flight requests, with
//! bounded waiters and a per-acquire timeout (spec.md §4.6).
//!
//! Every mutation of `acquired`/the waiter queue happens under one lock,
//! which is what makes the "no barging" guarantee (spec.md §5) free: a
//! fresh `acquire` and a concurrent `release` can never observe an
//! inconsistent queue, so a waiter already queued always wins over a
//! request that shows up after it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{FleetError, Result};
use crate::observability::Observability;

/// Sentinel stored in `max_concurrency` meaning "no limit" (spec.md §3
/// "0 or ∞ ⇒ unlimited bypass"). `u64::MAX` plays the role of "∞" here;
/// `0` is normalized to this sentinel at construction and on every
/// `set_max_concurrency` call.
const UNLIMITED: u64 = u64::MAX;

struct State {
    acquired: u64,
    /// Waiters keyed by their monotonically-increasing `id` (assigned
    /// under this same lock, so key order is arrival order). A `BTreeMap`
    /// gives the FIFO head in O(log n) and, critically, lets cancellation
    /// and timeout remove an arbitrary waiter in O(log n) instead of the
    /// O(n) scan a `VecDeque::retain` needs (spec.md §4.4 "removal must be
    /// O(log n) or amortized O(1)").
    waiters: BTreeMap<u64, oneshot::Sender<()>>,
}

struct Inner {
    max_concurrency: AtomicU64,
    max_pending_acquisitions: u32,
    timeout: Duration,
    state: Mutex<State>,
    next_id: AtomicU64,
    observability: Observability,
}

impl Inner {
    fn is_unlimited(&self) -> bool {
        self.max_concurrency.load(Ordering::Relaxed) == UNLIMITED
    }

    /// Hands the just-freed slot to the head waiter (if any and if
    /// `max_concurrency` has room for it) without changing `acquired` —
    /// the slot is transferred, not released and re-acquired. If
    /// `max_concurrency` has since been shrunk below the current
    /// `acquired` count, the transfer is skipped and `acquired` is
    /// decremented instead, leaving the waiter queued for a later release
    /// to re-evaluate; this is how `acquired` converges back under a
    /// lowered cap instead of perpetually handing off an inflated count
    /// (spec.md §4.6 "Dynamic maxConcurrency": "new waiters stay queued
    /// until releases bring it back under").
    fn release(&self) {
        let mut state = self.state.lock();
        let max = self.max_concurrency.load(Ordering::Relaxed);
        let head = state.waiters.keys().next().copied();

        let transfer = match head {
            Some(id) if state.acquired.saturating_sub(1) < max => Some(id),
            _ => None,
        };

        if let Some(id) = transfer {
            let sender = state.waiters.remove(&id).expect("head id observed under the same lock");
            let acquired = state.acquired;
            drop(state);
            // The receiver may already be gone (the waiter's future was
            // cancelled); that's fine, we just move on to whoever the
            // next `release` finds at the front.
            let _ = sender.send(());
            self.observability.metrics().on_released(acquired);
        } else {
            state.acquired -= 1;
            let acquired = state.acquired;
            drop(state);
            self.observability.metrics().on_released(acquired);
        }
    }

    /// Removes a specific waiter, used by cancellation and timeout.
    /// Returns `true` iff it was still queued (i.e. this call is the one
    /// that "wins" the race against a concurrent `release`).
    fn remove_waiter(&self, id: u64) -> bool {
        self.state.lock().waiters.remove(&id).is_some()
    }
}

/// A scoped token representing one unit of admitted concurrency. Dropping
/// it releases the slot; [`Permit::release`] does the same explicitly.
/// Both are idempotent — only the first release (explicit or via drop)
/// has any effect (spec.md §4.6 "Closing a permit once grants no
/// capacity; closing again is a no-op").
pub struct Permit {
    inner: Option<Arc<Inner>>,
}

impl Permit {
    fn granted(inner: Arc<Inner>) -> Self {
        Self { inner: Some(inner) }
    }

    fn noop() -> Self {
        Self { inner: None }
    }

    /// Explicitly releases the permit. Equivalent to dropping it; provided
    /// so call sites can release without waiting for scope exit.
    pub fn release(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

/// Bounded in-flight request limiter with bounded queueing and per-wait
/// timeouts (spec.md §4.6). Cheap to clone; every clone shares the same
/// underlying counters and queue.
#[derive(Clone)]
pub struct ConcurrencyLimit {
    inner: Arc<Inner>,
}

impl ConcurrencyLimit {
    /// `max_concurrency == 0` means unlimited (spec.md §3): every
    /// `acquire` completes synchronously with a no-op permit that never
    /// touches the counters or queue.
    pub fn new(max_concurrency: u64, max_pending_acquisitions: u32, timeout: Duration) -> Self {
        Self::with_observability(max_concurrency, max_pending_acquisitions, timeout, Observability::default())
    }

    pub fn with_observability(
        max_concurrency: u64,
        max_pending_acquisitions: u32,
        timeout: Duration,
        observability: Observability,
    ) -> Self {
        let normalized = if max_concurrency == 0 { UNLIMITED } else { max_concurrency };
        Self {
            inner: Arc::new(Inner {
                max_concurrency: AtomicU64::new(normalized),
                max_pending_acquisitions,
                timeout,
                state: Mutex::new(State {
                    acquired: 0,
                    waiters: BTreeMap::new(),
                }),
                next_id: AtomicU64::new(0),
                observability,
            }),
        }
    }

    /// Current effective ceiling; `None` means unlimited.
    pub fn max_concurrency(&self) -> Option<u64> {
        match self.inner.max_concurrency.load(Ordering::Relaxed) {
            UNLIMITED => None,
            n => Some(n),
        }
    }

    /// Changes the ceiling, evaluated fresh on every `acquire`/`release`
    /// from then on (spec.md §4.6 "Dynamic maxConcurrency"). `0` means
    /// unlimited. Shrinking never revokes already-granted permits.
    pub fn set_max_concurrency(&self, max_concurrency: u64) {
        let normalized = if max_concurrency == 0 { UNLIMITED } else { max_concurrency };
        self.inner.max_concurrency.store(normalized, Ordering::Relaxed);
    }

    pub fn acquired_count(&self) -> u64 {
        self.inner.state.lock().acquired
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Attempts to admit one more in-flight request. Resolves immediately
    /// if capacity is available; otherwise parks (subject to
    /// `max_pending_acquisitions` and the configured timeout) until a
    /// release frees a slot.
    pub async fn acquire(&self) -> Result<Permit> {
        if self.inner.is_unlimited() {
            return Ok(Permit::noop());
        }

        enum Decision {
            Granted,
            Rejected,
            Enqueued(u64, oneshot::Receiver<()>),
        }

        let decision = {
            let mut state = self.inner.state.lock();
            let max = self.inner.max_concurrency.load(Ordering::Relaxed);
            if state.waiters.is_empty() && state.acquired < max {
                state.acquired += 1;
                Decision::Granted
            } else if state.waiters.len() as u32 >= self.inner.max_pending_acquisitions {
                Decision::Rejected
            } else {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                state.waiters.insert(id, tx);
                Decision::Enqueued(id, rx)
            }
        };

        match decision {
            Decision::Granted => {
                self.inner.observability.metrics().on_acquired(self.acquired_count());
                Ok(Permit::granted(self.inner.clone()))
            }
            Decision::Rejected => {
                self.inner.observability.metrics().on_rejected();
                Err(FleetError::TooManyPendingAcquisitions(self.inner.max_pending_acquisitions))
            }
            Decision::Enqueued(id, rx) => {
                self.inner.observability.metrics().on_queue_depth(self.pending_count() as u32);

                struct CancelGuard<'a> {
                    inner: &'a Inner,
                    id: u64,
                    armed: bool,
                }
                impl Drop for CancelGuard<'_> {
                    fn drop(&mut self) {
                        if self.armed {
                            self.inner.remove_waiter(self.id);
                        }
                    }
                }
                let mut guard = CancelGuard {
                    inner: &self.inner,
                    id,
                    armed: true,
                };

                match tokio::time::timeout(self.inner.timeout, rx).await {
                    Ok(Ok(())) => {
                        guard.armed = false;
                        Ok(Permit::granted(self.inner.clone()))
                    }
                    Ok(Err(_)) => {
                        guard.armed = false;
                        Err(FleetError::ConcurrencyLimitTimeout(self.inner.timeout.as_millis() as u64))
                    }
                    Err(_elapsed) => {
                        let removed = self.inner.remove_waiter(id);
                        guard.armed = false;
                        if removed {
                            self.inner.observability.metrics().on_timed_out();
                            Err(FleetError::ConcurrencyLimitTimeout(self.inner.timeout.as_millis() as u64))
                        } else {
                            // The head waiter was granted in the window
                            // between the deadline firing and us taking
                            // the lock to cancel — `release` already
                            // incremented nothing (it transfers the slot),
                            // so the grant still holds.
                            Ok(Permit::granted(self.inner.clone()))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn unlimited_always_grants_synchronously() {
        let limit = ConcurrencyLimit::new(0, 0, Duration::from_secs(1));
        let permit = limit.acquire().await.unwrap();
        assert_eq!(limit.acquired_count(), 0);
        drop(permit);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn capacity_and_pending_queue_scenario_s5() {
        let limit = ConcurrencyLimit::new(2, 1, Duration::from_secs(100));

        let p1 = limit.acquire().await.unwrap();
        let p2 = limit.acquire().await.unwrap();
        assert_eq!(limit.acquired_count(), 2);

        let limit_clone = limit.clone();
        let waiter3 = tokio::spawn(async move { limit_clone.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limit.pending_count(), 1);

        let rejected = limit.acquire().await;
        assert!(matches!(rejected, Err(FleetError::TooManyPendingAcquisitions(1))));

        drop(p1);
        let p3 = waiter3.await.unwrap().unwrap();
        assert_eq!(limit.pending_count(), 0);
        assert_eq!(limit.acquired_count(), 2);

        drop(p2);
        drop(p3);
        assert_eq!(limit.acquired_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn waiter_times_out_scenario_s6() {
        let limit = ConcurrencyLimit::new(1, 3, Duration::from_millis(100));
        let p1 = limit.acquire().await.unwrap();

        let result = limit.acquire().await;
        assert!(matches!(result, Err(FleetError::ConcurrencyLimitTimeout(_))));
        assert_eq!(limit.pending_count(), 0);

        drop(p1);
        assert_eq!(limit.acquired_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn release_is_idempotent() {
        let limit = ConcurrencyLimit::new(1, 0, Duration::from_secs(1));
        let permit = limit.acquire().await.unwrap();
        assert_eq!(limit.acquired_count(), 1);
        permit.release();
        assert_eq!(limit.acquired_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fifo_grant_order_no_barging() {
        let limit = ConcurrencyLimit::new(1, 4, Duration::from_secs(5));
        let p1 = limit.acquire().await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limit = limit.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let permit = limit.acquire().await.unwrap();
                order.lock().push(i);
                // Hold briefly so grants are forced to interleave with
                // this task's own eventual release.
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(permit);
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(p1);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_waiter_is_removed_from_queue() {
        let limit = ConcurrencyLimit::new(1, 4, Duration::from_secs(30));
        let _p1 = limit.acquire().await.unwrap();

        let limit_clone = limit.clone();
        let handle = tokio::spawn(async move { limit_clone.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limit.pending_count(), 1);

        handle.abort();
        let _ = handle.await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limit.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shrinking_max_concurrency_does_not_revoke_existing_permits() {
        let limit = ConcurrencyLimit::new(3, 1, Duration::from_secs(5));
        let p1 = limit.acquire().await.unwrap();
        let p2 = limit.acquire().await.unwrap();
        let p3 = limit.acquire().await.unwrap();

        limit.set_max_concurrency(1);
        assert_eq!(limit.acquired_count(), 3);

        drop(p1);
        drop(p2);
        drop(p3);
        assert_eq!(limit.acquired_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shrinking_converges_acquired_back_under_cap_instead_of_stalling() {
        let limit = ConcurrencyLimit::new(3, 4, Duration::from_secs(5));
        let p1 = limit.acquire().await.unwrap();
        let p2 = limit.acquire().await.unwrap();
        let p3 = limit.acquire().await.unwrap();

        limit.set_max_concurrency(1);

        let limit_clone = limit.clone();
        let waiter = tokio::spawn(async move { limit_clone.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limit.pending_count(), 1);

        // Releasing the first two permits must shrink `acquired` toward
        // the new cap rather than handing the slot straight to the
        // waiter — otherwise `acquired` never converges below the old
        // capacity.
        drop(p1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limit.acquired_count(), 2);
        assert_eq!(limit.pending_count(), 1, "waiter must stay queued while still over the new cap");

        drop(p2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limit.acquired_count(), 1);
        assert_eq!(limit.pending_count(), 1, "still over cap until the third permit releases too");

        // Now acquired (1) - 1 < max (1) is false (0 < 1 is true) once p3
        // releases, so this release transfers the slot to the waiter
        // instead of draining further.
        drop(p3);
        let waiter_permit = waiter.await.unwrap().unwrap();
        assert_eq!(limit.acquired_count(), 1);
        assert_eq!(limit.pending_count(), 0);
        drop(waiter_permit);
        assert_eq!(limit.acquired_count(), 0);
    }
}
