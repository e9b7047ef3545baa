//! Mints service identity tokens scoped to a single task.

use std::sync::Arc;

use tracing::debug;

use crate::acl::{AclApi, NewServiceToken};
use crate::context::CallContext;
use crate::error::AclError;
use crate::identity::{IdentityRequest, IssuedToken};
use crate::limiter::RateLimiter;
use crate::metrics::{LatencyObserver, Timer};

/// Requests new service identity tokens from the ACL service.
pub struct TokenIssuer {
    api: Arc<dyn AclApi>,
    limiter: Arc<RateLimiter>,
    observer: Arc<dyn LatencyObserver>,
}

impl TokenIssuer {
    /// Create an issuer sharing `limiter` with the other call paths.
    pub fn new(
        api: Arc<dyn AclApi>,
        limiter: Arc<RateLimiter>,
        observer: Arc<dyn LatencyObserver>,
    ) -> Self {
        Self {
            api,
            limiter,
            observer,
        }
    }

    /// Create a token carrying only the service identity of `request.task_name`.
    ///
    /// A latency observation is recorded whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`AclError::Validation`] if any request field is empty (no network call)
    /// - [`AclError::Upstream`] if the ACL service rejects or fails the request
    /// - a cancellation-kind error if `ctx` fires
    pub async fn create_token(
        &self,
        ctx: &CallContext,
        request: &IdentityRequest,
    ) -> Result<IssuedToken, AclError> {
        let timer = Timer::start(&self.observer, "create_token");
        timer.finish(self.create_token_inner(ctx, request).await)
    }

    async fn create_token_inner(
        &self,
        ctx: &CallContext,
        request: &IdentityRequest,
    ) -> Result<IssuedToken, AclError> {
        request.validate()?;

        let partial = NewServiceToken::for_service(request.description(), &request.task_name);

        self.limiter.acquire(ctx).await?;
        let created = ctx
            .run(self.api.create_token(&partial))
            .await?
            .map_err(|e| AclError::upstream("create_token", e))?;

        debug!(
            task = %request.task_name,
            alloc_id = %request.alloc_id,
            accessor = %created.accessor_id,
            "service identity token created"
        );

        Ok(IssuedToken {
            task_name: request.task_name.clone(),
            accessor_id: created.accessor_id,
            secret_id: created.secret_id,
        })
    }
}
