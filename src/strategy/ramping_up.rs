//! Ramping-up weight transition (spec.md §4.5.3).
//!
//! Wraps a base weighted strategy. Unlike the other strategies, this one
//! carries state across rebuilds: each endpoint's *introduction time* has
//! to survive snapshot churn so `effectiveWeight` keeps climbing smoothly
//! rather than resetting to the ramp floor every time an unrelated sibling
//! endpoint comes or goes. The selector therefore never replaces this
//! index wholesale on a group update — it calls [`RampingUpIndex::rebuild_in_place`]
//! instead, and a periodic ticker (owned by the selector) calls it again
//! on a fixed cadence so weights keep climbing even when the group itself
//! is quiet.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::endpoint::Endpoint;
use crate::strategy::index::{SelectionKey, StrategyIndex};
use crate::strategy::weighted_random::WeightedRandomIndex;
use crate::strategy::wrr::WrrIndex;

/// Which stateless strategy ramping-up drives the endpoint weights into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseStrategyKind {
    WeightedRoundRobin,
    WeightedRandom,
}

fn build_base(kind: BaseStrategyKind, weighted: &[Endpoint]) -> Box<dyn StrategyIndex> {
    match kind {
        BaseStrategyKind::WeightedRoundRobin => Box::new(WrrIndex::build(weighted)),
        BaseStrategyKind::WeightedRandom => Box::new(WeightedRandomIndex::build(weighted)),
    }
}

pub(crate) struct RampingUpIndex {
    base: BaseStrategyKind,
    rampup: Duration,
    min_weight_percent: f64,
    aggression: f64,
    introduced: Mutex<HashMap<Endpoint, Instant>>,
    inner: ArcSwap<Box<dyn StrategyIndex>>,
}

impl RampingUpIndex {
    pub(crate) fn new(
        base: BaseStrategyKind,
        rampup: Duration,
        min_weight_percent: f64,
        aggression: f64,
        snapshot: &[Endpoint],
    ) -> Self {
        // Endpoints present in the very first snapshot the strategy ever
        // sees are pre-existing, not newly introduced — attaching
        // ramping-up to an already-stable group must not make its current
        // endpoints ramp from `min_weight_percent`. Seed them as already
        // fully ramped; only endpoints that show up in a later
        // `rebuild_in_place` call are genuinely new.
        let already_ramped = Instant::now()
            .checked_sub(rampup)
            .unwrap_or_else(Instant::now);
        let introduced = snapshot
            .iter()
            .filter(|e| e.weight() > 0)
            .map(|e| (e.clone(), already_ramped))
            .collect();
        let index = Self {
            base,
            rampup,
            min_weight_percent,
            aggression,
            introduced: Mutex::new(introduced),
            inner: ArcSwap::from_pointee(build_base(base, &[])),
        };
        index.rebuild_in_place(snapshot);
        index
    }

    fn effective_weight(&self, endpoint: &Endpoint, now: Instant, introduced_at: Instant) -> u32 {
        let declared = endpoint.weight() as f64;
        if declared == 0.0 || self.rampup.is_zero() {
            return endpoint.weight();
        }
        let elapsed = now.saturating_duration_since(introduced_at).as_secs_f64();
        let ratio = (elapsed / self.rampup.as_secs_f64()).clamp(0.0, 1.0);
        if ratio >= 1.0 {
            return endpoint.weight();
        }
        let floor = declared * self.min_weight_percent;
        let climbed = declared * ratio.powf(1.0 / self.aggression);
        climbed.max(floor).clamp(0.0, declared).round() as u32
    }

    /// `true` once every currently-tracked endpoint has reached its
    /// declared weight — the point at which the wrapper is behaviorally
    /// identical to the bare base strategy.
    pub(crate) fn converged(&self) -> bool {
        let now = Instant::now();
        let introduced = self.introduced.lock();
        introduced
            .iter()
            .all(|(_, at)| now.saturating_duration_since(*at) >= self.rampup)
    }
}

impl StrategyIndex for RampingUpIndex {
    fn pick(&self, key: SelectionKey) -> Option<Endpoint> {
        self.inner.load().pick(key)
    }

    fn rebuild_in_place(&self, snapshot: &[Endpoint]) {
        let now = Instant::now();
        let mut introduced = self.introduced.lock();
        introduced.retain(|e, _| snapshot.iter().any(|s| s == e && s.weight() > 0));
        for endpoint in snapshot.iter().filter(|e| e.weight() > 0) {
            introduced.entry(endpoint.clone()).or_insert(now);
        }

        let weighted: Vec<Endpoint> = snapshot
            .iter()
            .filter(|e| e.weight() > 0)
            .map(|e| {
                let at = *introduced.get(e).unwrap_or(&now);
                let effective = self.effective_weight(e, now, at);
                e.with_weight(effective)
            })
            .collect();
        drop(introduced);

        self.inner.store(std::sync::Arc::new(build_base(self.base, &weighted)));
    }
}
