//! In-memory ACL backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sidelegate::acl::{
    AclApi, AclPolicy, AclRole, ApiError, CreatedToken, Link, NewServiceToken, TokenListEntry,
    TokenSelf,
};
use sidelegate::metrics::LatencyObserver;

/// Scriptable fake that records every call it receives.
#[derive(Default)]
pub struct FakeAcl {
    credentials: HashMap<String, TokenSelf>,
    policies: HashMap<String, AclPolicy>,
    roles: HashMap<String, AclRole>,
    failing_deletes: HashSet<String>,
    fail_create: bool,
    listing: Option<Vec<TokenListEntry>>,
    delete_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<NewServiceToken>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn link(id: &str) -> Link {
    Link {
        id: id.to_owned(),
        name: format!("{id}-name"),
    }
}

impl FakeAcl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(mut self, secret: &str, policy_ids: &[&str]) -> Self {
        self.credentials.insert(
            secret.to_owned(),
            TokenSelf {
                accessor_id: format!("{secret}-accessor"),
                policies: policy_ids.iter().map(|id| link(id)).collect(),
                roles: Vec::new(),
            },
        );
        self
    }

    pub fn with_credential_roles(mut self, secret: &str, role_ids: &[&str]) -> Self {
        let entry = self
            .credentials
            .entry(secret.to_owned())
            .or_insert_with(|| TokenSelf {
                accessor_id: format!("{secret}-accessor"),
                policies: Vec::new(),
                roles: Vec::new(),
            });
        entry.roles = role_ids.iter().map(|id| link(id)).collect();
        self
    }

    pub fn with_policy(mut self, id: &str, rules: &str) -> Self {
        self.policies.insert(
            id.to_owned(),
            AclPolicy {
                id: id.to_owned(),
                name: format!("{id}-name"),
                rules: rules.to_owned(),
            },
        );
        self
    }

    pub fn with_role(mut self, id: &str, policy_ids: &[&str]) -> Self {
        self.roles.insert(
            id.to_owned(),
            AclRole {
                id: id.to_owned(),
                name: format!("{id}-name"),
                policies: policy_ids.iter().map(|id| link(id)).collect(),
            },
        );
        self
    }

    pub fn failing_delete(mut self, accessor: &str) -> Self {
        self.failing_deletes.insert(accessor.to_owned());
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_listing(mut self, accessors: &[&str]) -> Self {
        self.listing = Some(
            accessors
                .iter()
                .map(|a| TokenListEntry {
                    accessor_id: (*a).to_owned(),
                    description: String::new(),
                })
                .collect(),
        );
        self
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn created(&self) -> Vec<NewServiceToken> {
        self.created.lock().expect("created lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl AclApi for FakeAcl {
    async fn read_token_self(&self, credential: &str) -> Result<TokenSelf, ApiError> {
        self.record("read_token_self".to_owned());
        self.credentials
            .get(credential)
            .cloned()
            .ok_or_else(|| ApiError::HttpStatus {
                status: 403,
                body: "ACL not found".to_owned(),
            })
    }

    async fn read_policy(&self, policy_id: &str) -> Result<AclPolicy, ApiError> {
        self.record(format!("read_policy:{policy_id}"));
        self.policies
            .get(policy_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("policy {policy_id}")))
    }

    async fn read_role(&self, role_id: &str) -> Result<AclRole, ApiError> {
        self.record(format!("read_role:{role_id}"));
        self.roles
            .get(role_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("role {role_id}")))
    }

    async fn create_token(&self, request: &NewServiceToken) -> Result<CreatedToken, ApiError> {
        self.record("create_token".to_owned());
        self.created
            .lock()
            .expect("created lock")
            .push(request.clone());
        if self.fail_create {
            return Err(ApiError::HttpStatus {
                status: 500,
                body: "rpc error".to_owned(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedToken {
            accessor_id: format!("accessor-{n}"),
            secret_id: format!("secret-{n}"),
        })
    }

    async fn delete_token(&self, accessor_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_token:{accessor_id}"));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing_deletes.contains(accessor_id) {
            return Err(ApiError::HttpStatus {
                status: 500,
                body: "delete failed".to_owned(),
            });
        }
        Ok(())
    }

    async fn list_tokens(&self) -> Result<Vec<TokenListEntry>, ApiError> {
        self.record("list_tokens".to_owned());
        self.listing.clone().ok_or(ApiError::Unsupported)
    }
}

/// Backend that relies on the trait's default `list_tokens`.
pub struct NoListAcl;

#[async_trait]
impl AclApi for NoListAcl {
    async fn read_token_self(&self, _credential: &str) -> Result<TokenSelf, ApiError> {
        Err(ApiError::Unsupported)
    }
    async fn read_policy(&self, _policy_id: &str) -> Result<AclPolicy, ApiError> {
        Err(ApiError::Unsupported)
    }
    async fn read_role(&self, _role_id: &str) -> Result<AclRole, ApiError> {
        Err(ApiError::Unsupported)
    }
    async fn create_token(&self, _request: &NewServiceToken) -> Result<CreatedToken, ApiError> {
        Err(ApiError::Unsupported)
    }
    async fn delete_token(&self, _accessor_id: &str) -> Result<(), ApiError> {
        Err(ApiError::Unsupported)
    }
}

/// Latency observer that keeps every observation.
#[derive(Default)]
pub struct RecordingLatency {
    observations: Mutex<Vec<(&'static str, bool)>>,
}

impl RecordingLatency {
    pub fn observations(&self) -> Vec<(&'static str, bool)> {
        self.observations.lock().expect("observations lock").clone()
    }
}

impl LatencyObserver for RecordingLatency {
    fn observe(&self, op: &'static str, _elapsed: Duration, ok: bool) {
        self.observations
            .lock()
            .expect("observations lock")
            .push((op, ok));
    }
}
