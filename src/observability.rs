//! Minimal observability facade.
//!
//! The core publishes hooks for a metrics collector and a logger; it never
//! formats or exports measurements itself (spec.md §1). This mirrors the
//! shape of the teacher's `ObservabilityFacade` (a small set of object-safe
//! traits handed in at construction time) scoped down to what the endpoint
//! subsystem actually emits: structured log lines for swallowed listener
//! panics and strategy errors, and limiter gauges/counters.

use std::sync::Arc;

/// Severity of a logged event, matching `tracing`'s levels so a
/// `TracingLogger` can forward 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured logging sink. A listener or strategy that panics never takes
/// down the caller; the failure is reported here instead (spec.md §7).
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: LogLevel, target: &str, message: &str);
}

/// Default logger: forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "fleet_core", subsystem = target, "{message}"),
            LogLevel::Info => tracing::info!(target: "fleet_core", subsystem = target, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "fleet_core", subsystem = target, "{message}"),
            LogLevel::Error => tracing::error!(target: "fleet_core", subsystem = target, "{message}"),
        }
    }
}

/// Observable gauges/counters a metrics collector can subscribe to. Every
/// method has a no-op default so implementers only override what they
/// care about.
pub trait LimiterMetrics: Send + Sync + 'static {
    fn on_acquired(&self, _active: u64) {}
    fn on_released(&self, _active: u64) {}
    fn on_rejected(&self) {}
    fn on_timed_out(&self) {}
    fn on_queue_depth(&self, _depth: u32) {}
}

/// No-op metrics sink, used as the default so callers never have to thread
/// an `Option` through the hot path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl LimiterMetrics for NoopMetrics {}

/// Shared handle bundling the two observability hooks, cheap to clone and
/// pass into every group/selector/limiter.
#[derive(Clone)]
pub struct Observability {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn LimiterMetrics>,
}

impl Default for Observability {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

impl Observability {
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn LimiterMetrics>) -> Self {
        Self { logger, metrics }
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn metrics(&self) -> &Arc<dyn LimiterMetrics> {
        &self.metrics
    }

    pub(crate) fn warn(&self, target: &str, message: impl AsRef<str>) {
        self.logger.log(LogLevel::Warn, target, message.as_ref());
    }
}

impl std::fmt::Debug for Observability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observability").finish_non_exhaustive()
    }
}
