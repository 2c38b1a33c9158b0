//! Endpoint selection strategies (spec.md §4.5).
//!
//! A [`SelectionStrategy`] is a cheap, `Clone`-able description of *how* to
//! pick; [`SelectionStrategy::build`] turns it plus one snapshot into an
//! `Arc<dyn StrategyIndex>` the selector consults on the hot path. Every
//! variant validates its parameters at construction time (via
//! [`SelectionStrategy::round_robin`] and friends) rather than at build
//! time, so a misconfigured strategy fails where the caller can see it.

mod index;
mod ramping_up;
mod ring_hash;
mod sticky;
mod weighted_random;
mod wrr;

use std::sync::Arc;
use std::time::Duration;

pub use index::{HasherKind, SelectionKey, StrategyIndex};
pub use ramping_up::BaseStrategyKind;

use crate::endpoint::Endpoint;
use crate::error::{FleetError, Result};
use ramping_up::RampingUpIndex;
use ring_hash::RingHashIndex;
use sticky::StickyIndex;
use weighted_random::WeightedRandomIndex;
use wrr::WrrIndex;

/// Default ring size used when [`RingHashConfig`] doesn't override it.
pub const DEFAULT_RING_SIZE: u32 = 1024;

/// Parameters for the ramping-up strategy (spec.md §4.5.3).
#[derive(Debug, Clone)]
pub struct RampingUpConfig {
    pub base: BaseStrategyKind,
    pub rampup: Duration,
    pub min_weight_percent: f64,
    pub aggression: f64,
}

impl RampingUpConfig {
    pub fn new(base: BaseStrategyKind, rampup: Duration, min_weight_percent: f64, aggression: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_weight_percent) {
            return Err(FleetError::InvalidStrategyParameter(format!(
                "minWeightPercent must be within [0, 1], got {min_weight_percent}"
            )));
        }
        if !(aggression > 0.0) {
            return Err(FleetError::InvalidStrategyParameter(format!(
                "aggression must be > 0, got {aggression}"
            )));
        }
        Ok(Self {
            base,
            rampup,
            min_weight_percent,
            aggression,
        })
    }
}

/// Parameters for the ring-hash strategy (spec.md §4.5.4).
#[derive(Debug, Clone, Copy)]
pub struct RingHashConfig {
    pub max_ring_size: u32,
}

impl RingHashConfig {
    pub fn new(max_ring_size: u32) -> Result<Self> {
        if max_ring_size == 0 {
            return Err(FleetError::InvalidStrategyParameter(
                "maxRingSize must be > 0".to_string(),
            ));
        }
        Ok(Self { max_ring_size })
    }
}

impl Default for RingHashConfig {
    fn default() -> Self {
        Self {
            max_ring_size: DEFAULT_RING_SIZE,
        }
    }
}

/// Parameters for the sticky-hash strategy (spec.md §4.5.5, SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy)]
pub struct StickyConfig {
    pub hasher: HasherKind,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            hasher: HasherKind::Default,
        }
    }
}

/// A selection strategy description. Cheap to clone; the expensive part
/// (sorting a ring, filling a cumulative-weight table) happens in
/// [`SelectionStrategy::build`], off the selection hot path.
#[derive(Debug, Clone)]
pub enum SelectionStrategy {
    RoundRobin,
    WeightedRoundRobin,
    WeightedRandom,
    RampingUp(RampingUpConfig),
    RingHash(RingHashConfig),
    Sticky(StickyConfig),
}

impl SelectionStrategy {
    pub fn round_robin() -> Self {
        Self::RoundRobin
    }

    pub fn weighted_round_robin() -> Self {
        Self::WeightedRoundRobin
    }

    pub fn weighted_random() -> Self {
        Self::WeightedRandom
    }

    pub fn ramping_up(config: RampingUpConfig) -> Self {
        Self::RampingUp(config)
    }

    pub fn ring_hash(config: RingHashConfig) -> Self {
        Self::RingHash(config)
    }

    pub fn sticky(config: StickyConfig) -> Self {
        Self::Sticky(config)
    }

    /// `true` for [`SelectionStrategy::RampingUp`], the only variant whose
    /// index survives rebuilds rather than being replaced wholesale. The
    /// selector uses this to decide whether a group update calls
    /// `rebuild_in_place` on the existing index or swaps in a fresh one.
    pub(crate) fn is_stateful(&self) -> bool {
        matches!(self, Self::RampingUp(_))
    }

    /// Builds a fresh index from one snapshot. Round-robin has no weighting
    /// concept of its own; it's implemented as weighted-round-robin over a
    /// snapshot with every weight normalized to 1, so "round robin" and
    /// "weighted round robin with uniform weights" share one code path.
    pub(crate) fn build(&self, snapshot: &[Endpoint]) -> Arc<dyn StrategyIndex> {
        match self {
            Self::RoundRobin => {
                let uniform: Vec<Endpoint> = snapshot.iter().map(|e| e.with_weight(1)).collect();
                Arc::new(WrrIndex::build(&uniform))
            }
            Self::WeightedRoundRobin => Arc::new(WrrIndex::build(snapshot)),
            Self::WeightedRandom => Arc::new(WeightedRandomIndex::build(snapshot)),
            Self::RampingUp(cfg) => Arc::new(RampingUpIndex::new(
                cfg.base,
                cfg.rampup,
                cfg.min_weight_percent,
                cfg.aggression,
                snapshot,
            )),
            Self::RingHash(cfg) => Arc::new(RingHashIndex::build(snapshot, cfg.max_ring_size)),
            Self::Sticky(_) => Arc::new(StickyIndex::build(snapshot)),
        }
    }
}
