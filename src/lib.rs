//! `fleet_core`: the client-side endpoint subsystem of an HTTP/RPC
//! networking core — observable endpoint groups, pluggable selection
//! strategies, and a concurrency limiter, with no opinion on transport,
//! DNS resolution, or wire protocol (spec.md §1).
//!
//! The pieces compose top to bottom:
//! - [`endpoint`] — the `Endpoint` value type.
//! - [`group`] — observable collections of endpoints (static, dynamic,
//!   composite, `orElse`, file-watched).
//! - [`watcher`] — the filesystem-watch registry backing file-watched
//!   groups.
//! - [`strategy`] — pluggable selection algorithms over one snapshot.
//! - [`selector`] — the async pick operation layering a pending-request
//!   queue and timeouts over a strategy.
//! - [`limits`] — `ConcurrencyLimit`, a bounded in-flight request permit
//!   broker independent of endpoint selection.
//! - [`observability`] / [`error`] — the ambient logging/metrics facade
//!   and the shared error taxonomy.

pub mod endpoint;
pub mod error;
pub mod group;
pub mod limits;
pub mod observability;
pub mod selector;
pub mod strategy;
pub mod watcher;

pub use endpoint::{AttributeValue, Endpoint, EndpointBuilder};
pub use error::{FleetError, Result};
pub use group::{CompositeGroup, DynamicGroup, EndpointGroup, EndpointGroupExt, FileWatchedGroup, OrElseGroup, StaticGroup};
pub use limits::{ConcurrencyLimit, Permit};
pub use observability::{LimiterMetrics, LogLevel, Logger, Observability};
pub use selector::EndpointSelector;
pub use strategy::{
    BaseStrategyKind, HasherKind, RampingUpConfig, RingHashConfig, SelectionKey, SelectionStrategy, StickyConfig,
};
pub use watcher::FileWatcherRegistry;
