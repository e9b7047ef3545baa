//! Decides whether an administrative credential may mint a token for a service.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::{parse_rules, RuleModel, SERVICE_WILDCARD};
use crate::acl::AclApi;
use crate::context::CallContext;
use crate::error::AclError;
use crate::limiter::RateLimiter;

/// Whether `model` grants `write` on the service `task`.
///
/// Exact rules are consulted first (a name of `"*"` matches any service),
/// then prefix rules (the empty prefix matches any service). Comparison is
/// case-insensitive. Anything else denies.
pub fn allows(task: &str, model: &RuleModel) -> bool {
    let task = task.to_lowercase();

    let exact = model.exact.iter().any(|rule| {
        rule.permission.is_write() && (rule.name == task || rule.name == SERVICE_WILDCARD)
    });
    if exact {
        return true;
    }

    model
        .prefix
        .iter()
        .any(|rule| rule.permission.is_write() && task.starts_with(rule.name.as_str()))
}

/// Checks an administrative credential's policies against a service name.
pub struct PolicyEvaluator {
    api: Arc<dyn AclApi>,
    limiter: Arc<RateLimiter>,
    check_role_policies: bool,
}

impl PolicyEvaluator {
    /// Create an evaluator that checks only directly attached policies.
    pub fn new(api: Arc<dyn AclApi>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            api,
            limiter,
            check_role_policies: false,
        }
    }

    /// Also evaluate policies granted through the credential's roles.
    #[must_use]
    pub fn with_role_policies(mut self, enabled: bool) -> Self {
        self.check_role_policies = enabled;
        self
    }

    /// Verify `credential` could itself write the service `task`.
    ///
    /// Resolves the credential once, then fetches and evaluates each
    /// attached policy in order until one allows. When role checking is
    /// enabled, role-linked policies not already seen are evaluated next.
    ///
    /// # Errors
    ///
    /// - [`AclError::Validation`] for a blank credential (no network call)
    /// - [`AclError::PermissionDenied`] if no policy allows
    /// - [`AclError::Upstream`] on any lookup failure
    /// - [`AclError::Parse`] if a policy's rules are malformed or empty
    /// - a cancellation-kind error if `ctx` fires
    pub async fn check_policy(
        &self,
        ctx: &CallContext,
        task: &str,
        credential: &str,
    ) -> Result<(), AclError> {
        if credential.trim().is_empty() {
            return Err(AclError::Validation("missing ACL token".to_owned()));
        }

        self.limiter.acquire(ctx).await?;
        let token = ctx
            .run(self.api.read_token_self(credential))
            .await?
            .map_err(|e| AclError::upstream("read_token_self", e))?;

        let mut checked: HashSet<String> = HashSet::new();
        for link in &token.policies {
            if !checked.insert(link.id.clone()) {
                continue;
            }
            if self.policy_allows(ctx, task, &link.id).await? {
                debug!(task, policy = %link.name, "ACL policy allows service write");
                return Ok(());
            }
        }

        if self.check_role_policies {
            for role_link in &token.roles {
                self.limiter.acquire(ctx).await?;
                let role = ctx
                    .run(self.api.read_role(&role_link.id))
                    .await?
                    .map_err(|e| AclError::upstream("read_role", e))?;

                for link in &role.policies {
                    if !checked.insert(link.id.clone()) {
                        continue;
                    }
                    if self.policy_allows(ctx, task, &link.id).await? {
                        debug!(
                            task,
                            role = %role.name,
                            policy = %link.name,
                            "ACL role policy allows service write"
                        );
                        return Ok(());
                    }
                }
            }
        }

        debug!(
            task,
            accessor = %token.accessor_id,
            policies = checked.len(),
            "no ACL policy allows service write"
        );
        Err(AclError::PermissionDenied {
            task: task.to_owned(),
        })
    }

    async fn policy_allows(
        &self,
        ctx: &CallContext,
        task: &str,
        policy_id: &str,
    ) -> Result<bool, AclError> {
        self.limiter.acquire(ctx).await?;
        let policy = ctx
            .run(self.api.read_policy(policy_id))
            .await?
            .map_err(|e| AclError::upstream("read_policy", e))?;

        let model = parse_rules(&policy.rules)?;
        Ok(allows(task, &model))
    }
}
