//! Single entry point for service identity token operations.
//!
//! [`AclFacade`] owns the shared [`RateLimiter`] and injects it into the
//! policy evaluator, issuer, and revoker. It is `Send + Sync` and meant to
//! be shared behind an `Arc` by every caller in the process.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::acl::consul::ConsulAclClient;
use crate::acl::{AclApi, ApiError};
use crate::config::Config;
use crate::context::CallContext;
use crate::error::AclError;
use crate::identity::{IdentityRequest, IssuedToken, RevocationTarget};
use crate::issuer::TokenIssuer;
use crate::limiter::{RateLimiter, DEFAULT_REQUESTS_PER_SECOND};
use crate::metrics::{LatencyObserver, Timer, TracingLatency};
use crate::policy::PolicyEvaluator;
use crate::revoker::{TokenRevoker, DEFAULT_MAX_PARALLEL_REVOKES};

/// Capability interface used by schedulers and allocation runners.
#[async_trait]
pub trait ServiceIdentityAcls: Send + Sync {
    /// Check that `credential` could itself write the service `task`.
    ///
    /// # Errors
    ///
    /// See [`PolicyEvaluator::check_policy`].
    async fn check_policy(
        &self,
        ctx: &CallContext,
        task: &str,
        credential: &str,
    ) -> Result<(), AclError>;

    /// Mint a token scoped to `request.task_name`.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::create_token`].
    async fn create_token(
        &self,
        ctx: &CallContext,
        request: &IdentityRequest,
    ) -> Result<IssuedToken, AclError>;

    /// Revoke a batch of previously issued tokens.
    ///
    /// # Errors
    ///
    /// See [`TokenRevoker::revoke_tokens`].
    async fn revoke_tokens(
        &self,
        ctx: &CallContext,
        targets: &[RevocationTarget],
    ) -> Result<(), AclError>;

    /// Accessor ids of every token known to the ACL service.
    ///
    /// Used by reconciliation to find orphaned tokens.
    ///
    /// # Errors
    ///
    /// [`AclError::NotImplemented`] if the backend cannot list tokens,
    /// otherwise [`AclError::Upstream`] or a cancellation-kind error.
    async fn list_tokens(&self, ctx: &CallContext) -> Result<BTreeSet<String>, AclError>;
}

/// Tunables for [`AclFacade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacadeOptions {
    /// Sustained request rate; burst equals the rate.
    pub requests_per_second: u32,
    /// Concurrent deletes per revocation batch.
    pub max_parallel_revokes: usize,
    /// Whether role-linked policies count toward the policy check.
    pub check_role_policies: bool,
}

impl Default for FacadeOptions {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_parallel_revokes: DEFAULT_MAX_PARALLEL_REVOKES,
            check_role_policies: false,
        }
    }
}

/// Composes policy checking, issuance, revocation, and listing.
pub struct AclFacade {
    api: Arc<dyn AclApi>,
    limiter: Arc<RateLimiter>,
    observer: Arc<dyn LatencyObserver>,
    evaluator: PolicyEvaluator,
    issuer: TokenIssuer,
    revoker: TokenRevoker,
}

impl AclFacade {
    /// Build a facade over `api`, reporting latency through `tracing`.
    pub fn new(api: Arc<dyn AclApi>, options: FacadeOptions) -> Self {
        Self::with_observer(api, options, Arc::new(TracingLatency))
    }

    /// Build a facade with a custom latency observer.
    pub fn with_observer(
        api: Arc<dyn AclApi>,
        options: FacadeOptions,
        observer: Arc<dyn LatencyObserver>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::per_second(options.requests_per_second));
        Self::with_limiter(api, options, observer, limiter)
    }

    /// Build a facade around an existing limiter, e.g. one shared with other subsystems.
    pub fn with_limiter(
        api: Arc<dyn AclApi>,
        options: FacadeOptions,
        observer: Arc<dyn LatencyObserver>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let evaluator = PolicyEvaluator::new(Arc::clone(&api), Arc::clone(&limiter))
            .with_role_policies(options.check_role_policies);
        let issuer = TokenIssuer::new(
            Arc::clone(&api),
            Arc::clone(&limiter),
            Arc::clone(&observer),
        );
        let revoker = TokenRevoker::new(
            Arc::clone(&api),
            Arc::clone(&limiter),
            Arc::clone(&observer),
            options.max_parallel_revokes,
        );
        debug!(
            requests_per_second = options.requests_per_second,
            max_parallel_revokes = revoker.max_parallel(),
            check_role_policies = options.check_role_policies,
            "ACL facade initialised"
        );
        Self {
            api,
            limiter,
            observer,
            evaluator,
            issuer,
            revoker,
        }
    }

    /// Build a facade talking to Consul as described by `config`.
    ///
    /// `management_token` authenticates policy, role, and token management calls.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the Consul client cannot be constructed.
    pub fn from_config(config: &Config, management_token: String) -> Result<Self, ApiError> {
        let client = ConsulAclClient::new(
            &config.consul.address,
            management_token,
            Duration::from_secs(config.consul.request_timeout_secs),
        )?;
        Ok(Self::new(Arc::new(client), config.facade_options()))
    }

    /// The limiter shared by every call path.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn list_accessors(&self, ctx: &CallContext) -> Result<BTreeSet<String>, AclError> {
        self.limiter.acquire(ctx).await?;
        let tokens = ctx
            .run(self.api.list_tokens())
            .await?
            .map_err(|e| match e {
                ApiError::Unsupported => AclError::NotImplemented("list_tokens"),
                other => AclError::upstream("list_tokens", other),
            })?;
        Ok(tokens.into_iter().map(|t| t.accessor_id).collect())
    }
}

#[async_trait]
impl ServiceIdentityAcls for AclFacade {
    async fn check_policy(
        &self,
        ctx: &CallContext,
        task: &str,
        credential: &str,
    ) -> Result<(), AclError> {
        self.evaluator.check_policy(ctx, task, credential).await
    }

    async fn create_token(
        &self,
        ctx: &CallContext,
        request: &IdentityRequest,
    ) -> Result<IssuedToken, AclError> {
        self.issuer.create_token(ctx, request).await
    }

    async fn revoke_tokens(
        &self,
        ctx: &CallContext,
        targets: &[RevocationTarget],
    ) -> Result<(), AclError> {
        self.revoker.revoke_tokens(ctx, targets).await
    }

    async fn list_tokens(&self, ctx: &CallContext) -> Result<BTreeSet<String>, AclError> {
        let timer = Timer::start(&self.observer, "list_tokens");
        timer.finish(self.list_accessors(ctx).await)
    }
}
