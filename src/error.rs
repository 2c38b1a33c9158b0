//! Unified error taxonomy for the endpoint subsystem.
//!
//! Mirrors the error categories in the design notes: configuration errors
//! surface synchronously from builders/parsers, capacity errors surface
//! synchronously from `acquire`, and timeout errors surface through the
//! future a caller is already awaiting. Transient unavailability (an empty
//! group) is intentionally not a variant here — callers see `None`, never
//! an `Err`.

use thiserror::Error;

/// The stable error codes the subsystem can produce.
///
/// `Display` renders a short machine-stable code (matching the abstract
/// names callers configure against), while the `#[error(...)]` message
/// carries the human-readable detail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// A host/port literal failed to parse, or an endpoint was constructed
    /// without either a hostname or an IP address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A selection strategy was configured with an out-of-range parameter
    /// (e.g. `aggression <= 0`, `minWeightPercent` outside `[0, 1]`).
    #[error("invalid strategy parameter: {0}")]
    InvalidStrategyParameter(String),

    /// A selection timed out before any candidate endpoint became
    /// available. Only produced by the `_or_fail` family of selection
    /// calls; the `_or_timeout` family resolves to `Ok(None)` instead.
    #[error("selection timed out after {0}ms")]
    SelectionTimeout(u64),

    /// A waiter on a `ConcurrencyLimit` was not granted a permit before
    /// its deadline elapsed.
    #[error("concurrency limit acquisition timed out after {0}ms")]
    ConcurrencyLimitTimeout(u64),

    /// `ConcurrencyLimit::acquire` was called while the pending-waiter
    /// queue was already at capacity.
    #[error("too many pending acquisitions (capacity {0})")]
    TooManyPendingAcquisitions(u32),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, FleetError>;
