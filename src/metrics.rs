//! Latency observations for ACL operations.
//!
//! Emission plumbing is left to the embedding process: the default
//! [`TracingLatency`] observer turns each observation into a `debug!` event
//! on the `sidelegate::metrics` target, which a subscriber layer can forward
//! to whatever metrics sink is in use.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Receives one observation per facade operation, success or failure.
pub trait LatencyObserver: Send + Sync {
    /// Record that `op` took `elapsed` and whether it succeeded.
    fn observe(&self, op: &'static str, elapsed: Duration, ok: bool);
}

/// Observer that logs observations through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLatency;

impl LatencyObserver for TracingLatency {
    fn observe(&self, op: &'static str, elapsed: Duration, ok: bool) {
        debug!(
            target: "sidelegate::metrics",
            op,
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            ok,
            "acl operation timing"
        );
    }
}

/// Times an operation and reports it once.
///
/// A timer dropped before [`Timer::finish`] (the caller dropped the
/// operation's future) reports a failed observation.
pub(crate) struct Timer {
    observer: Option<Arc<dyn LatencyObserver>>,
    op: &'static str,
    started: Instant,
}

impl Timer {
    pub(crate) fn start(observer: &Arc<dyn LatencyObserver>, op: &'static str) -> Self {
        Self {
            observer: Some(Arc::clone(observer)),
            op,
            started: Instant::now(),
        }
    }

    /// Report the elapsed time, passing `result` through unchanged.
    pub(crate) fn finish<T, E>(mut self, result: Result<T, E>) -> Result<T, E> {
        self.report(result.is_ok());
        result
    }

    fn report(&mut self, ok: bool) {
        if let Some(observer) = self.observer.take() {
            observer.observe(self.op, self.started.elapsed(), ok);
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.report(false);
    }
}
