//! Batch revocation of service identity tokens.
//!
//! Deletes run on a bounded pool: at most `max_parallel` deletes are in
//! flight, each acquiring its own rate limiter permit. The first failure
//! stops dispatch; deletes already in flight are allowed to finish and the
//! first error observed is returned. The batch may therefore be partially
//! applied. Deleting an already-deleted accessor succeeds, so callers can
//! retry the whole batch.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{trace, warn};

use crate::acl::{AclApi, ApiError};
use crate::context::CallContext;
use crate::error::AclError;
use crate::identity::RevocationTarget;
use crate::limiter::RateLimiter;
use crate::metrics::{LatencyObserver, Timer};

/// Default cap on concurrent delete calls per batch.
pub const DEFAULT_MAX_PARALLEL_REVOKES: usize = 64;

/// Revokes batches of tokens by accessor id.
pub struct TokenRevoker {
    api: Arc<dyn AclApi>,
    limiter: Arc<RateLimiter>,
    observer: Arc<dyn LatencyObserver>,
    max_parallel: usize,
}

impl TokenRevoker {
    /// Create a revoker with at most `max_parallel` deletes in flight (minimum 1).
    pub fn new(
        api: Arc<dyn AclApi>,
        limiter: Arc<RateLimiter>,
        observer: Arc<dyn LatencyObserver>,
        max_parallel: usize,
    ) -> Self {
        Self {
            api,
            limiter,
            observer,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Concurrency cap for one batch.
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Revoke every target, aborting dispatch at the first failure.
    ///
    /// Targets are dispatched in order. With a cap of one the batch runs
    /// strictly sequentially and nothing after the failing target is attempted.
    /// With a larger cap (the default is 64), targets after the failing one
    /// may already be in flight when the failure is seen; they run to
    /// completion, but nothing further is dispatched. A target with a blank
    /// accessor id fails with [`AclError::Validation`] without a delete call.
    ///
    /// # Errors
    ///
    /// Returns the first failure observed: [`AclError::Upstream`] naming
    /// the failing accessor, [`AclError::Validation`] for a blank accessor,
    /// or a cancellation-kind error if `ctx` fires.
    pub async fn revoke_tokens(
        &self,
        ctx: &CallContext,
        targets: &[RevocationTarget],
    ) -> Result<(), AclError> {
        let timer = Timer::start(&self.observer, "revoke_tokens");
        timer.finish(self.revoke_batch(ctx, targets).await)
    }

    async fn revoke_batch(
        &self,
        ctx: &CallContext,
        targets: &[RevocationTarget],
    ) -> Result<(), AclError> {
        let mut in_flight: JoinSet<Result<(), AclError>> = JoinSet::new();
        let mut first_error: Option<AclError> = None;

        for target in targets {
            // Pick up anything that already finished.
            while let Some(joined) = in_flight.try_join_next() {
                record(&mut first_error, joined);
            }

            // At capacity: wait for a slot.
            while first_error.is_none() && in_flight.len() >= self.max_parallel {
                match ctx.run(in_flight.join_next()).await {
                    Ok(Some(joined)) => record(&mut first_error, joined),
                    Ok(None) => break,
                    Err(e) => first_error = Some(e),
                }
            }

            if first_error.is_none() {
                if let Err(e) = ctx.check() {
                    first_error = Some(e);
                }
            }
            if first_error.is_some() {
                break;
            }

            in_flight.spawn(revoke_one(
                Arc::clone(&self.api),
                Arc::clone(&self.limiter),
                ctx.clone(),
                target.clone(),
            ));
        }

        while let Some(joined) = in_flight.join_next().await {
            record(&mut first_error, joined);
        }

        match first_error {
            Some(e) => {
                warn!(error = %e, batch = targets.len(), "token revocation batch aborted");
                Err(e)
            }
            None => Ok(()),
        }
    }
}

async fn revoke_one(
    api: Arc<dyn AclApi>,
    limiter: Arc<RateLimiter>,
    ctx: CallContext,
    target: RevocationTarget,
) -> Result<(), AclError> {
    trace!(
        task = %target.task_name,
        alloc_id = %target.alloc_id,
        node_id = %target.node_id,
        "revoke service identity token"
    );
    target.validate()?;
    limiter.acquire(&ctx).await?;
    ctx.run(api.delete_token(&target.accessor_id))
        .await?
        .map_err(|e| AclError::upstream_for("delete_token", &target.accessor_id, e))
}

/// Keep the first error; later ones are dropped.
fn record(
    first_error: &mut Option<AclError>,
    joined: Result<Result<(), AclError>, tokio::task::JoinError>,
) {
    let outcome = joined.unwrap_or_else(|e| {
        Err(AclError::upstream(
            "delete_token",
            ApiError::Other(format!("revocation task failed: {e}")),
        ))
    });
    if let Err(e) = outcome {
        if first_error.is_none() {
            *first_error = Some(e);
        }
    }
}
