//! spec.md §8 S6 — capacity 1, pending cap 3, timeout 500ms: the second
//! acquire fails with `ConcurrencyLimitTimeout` at the deadline; releasing
//! the first permit afterwards is a no-op (no waiters left).

use std::time::Duration;

use fleet_core::{ConcurrencyLimit, FleetError};

#[tokio::test(start_paused = true)]
async fn waiter_times_out_at_the_configured_deadline() {
    let limit = ConcurrencyLimit::new(1, 3, Duration::from_millis(500));
    let p1 = limit.acquire().await.unwrap();

    let limit_for_waiter = limit.clone();
    let waiter = tokio::spawn(async move { limit_for_waiter.acquire().await });
    tokio::task::yield_now().await;
    assert_eq!(limit.pending_count(), 1);

    tokio::time::advance(Duration::from_millis(500)).await;
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(FleetError::ConcurrencyLimitTimeout(500))));
    assert_eq!(limit.pending_count(), 0);

    drop(p1);
    assert_eq!(limit.acquired_count(), 0);
}
