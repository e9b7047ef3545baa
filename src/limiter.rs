//! Token-bucket limiter shared by every outbound ACL call.
//!
//! One [`RateLimiter`] is constructed by the facade and handed (as an
//! `Arc`) to the issuer, revoker, and policy evaluator, giving a single
//! global ceiling on request rate regardless of caller parallelism.
//!
//! Acquisition reserves a token up front and sleeps for the deficit, so
//! waiters are served roughly in arrival order. A reservation abandoned by
//! cancellation is returned to the bucket.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::context::CallContext;
use crate::error::AclError;

/// Default sustained request rate, per second.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 500;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Async token-bucket rate limiter.
///
/// Uses a sync [`Mutex`] since the critical section is very short (no awaits).
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Bucket>,
    rate: f64,
    burst: f64,
}

impl RateLimiter {
    /// Create a limiter with a sustained rate and a burst capacity.
    ///
    /// Zero values are raised to one.
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rate = f64::from(requests_per_second.max(1));
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            rate,
            burst,
        }
    }

    /// Create a limiter whose burst equals its sustained rate.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, requests_per_second)
    }

    /// Take a permit if one is immediately available.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait for a permit.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Cancelled`] or [`AclError::DeadlineExceeded`] if
    /// `ctx` fires before the permit is available. A wait that would end
    /// after the context's deadline fails immediately.
    pub async fn acquire(&self, ctx: &CallContext) -> Result<(), AclError> {
        ctx.check()?;

        let wait = self.reserve();
        if wait.is_zero() {
            return Ok(());
        }

        if let Some(deadline) = ctx.deadline() {
            let ready_at = Instant::now().checked_add(wait);
            if ready_at.map_or(true, |at| at > deadline) {
                self.cancel_reservation();
                return Err(AclError::DeadlineExceeded);
            }
        }

        trace!(
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "waiting for ACL rate limiter"
        );
        match ctx.run(tokio::time::sleep(wait)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.cancel_reservation();
                Err(e)
            }
        }
    }

    /// Approximate number of immediately available permits.
    pub fn available(&self) -> f64 {
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        bucket.tokens.max(0.0)
    }

    /// Reserve one token, returning how long until it is valid.
    fn reserve(&self) -> Duration {
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    fn cancel_reservation(&self) {
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_second(DEFAULT_REQUESTS_PER_SECOND)
    }
}
