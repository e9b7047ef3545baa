//! Configuration loading and validation.
//!
//! ```toml
//! cluster_id = "5b1c5f3e-prod"
//!
//! [consul]
//! address = "http://127.0.0.1:8500"
//! token_env = "CONSUL_HTTP_TOKEN"
//!
//! [limits]
//! requests_per_second = 500
//! max_parallel_revokes = 64
//!
//! [policy]
//! check_role_policies = false
//!
//! [logging]
//! trace_revocations = false
//! timings = false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::acl::consul::{parse_base_url, DEFAULT_CONSUL_ADDRESS};
use crate::facade::FacadeOptions;
use crate::identity::IdentityRequest;
use crate::limiter::DEFAULT_REQUESTS_PER_SECOND;
use crate::revoker::DEFAULT_MAX_PARALLEL_REVOKES;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Cluster id stamped into every token description.
    pub cluster_id: String,

    /// ACL service connection settings.
    #[serde(default)]
    pub consul: ConsulConfig,

    /// Outbound request limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Policy check behaviour.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Extra log targets layered over `RUST_LOG`.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// ACL service connection settings.
#[derive(Debug, Deserialize)]
pub struct ConsulConfig {
    /// Base HTTP(S) address of the Consul agent.
    #[serde(default = "default_address")]
    pub address: String,

    /// Environment variable name holding the management token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Outbound request limits.
#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    /// Sustained requests per second across all call paths; burst equals this.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Concurrent deletes per revocation batch.
    #[serde(default = "default_max_parallel_revokes")]
    pub max_parallel_revokes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            max_parallel_revokes: default_max_parallel_revokes(),
        }
    }
}

/// Policy check behaviour.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyConfig {
    /// Also evaluate policies granted through the credential's roles.
    #[serde(default)]
    pub check_role_policies: bool,
}

/// Extra log targets layered over `RUST_LOG`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log every individual revocation (task, alloc, node) at TRACE.
    #[serde(default)]
    pub trace_revocations: bool,

    /// Log per-operation latency observations from the `sidelegate::metrics` target.
    #[serde(default)]
    pub timings: bool,
}

// Default value functions for serde

fn default_address() -> String {
    DEFAULT_CONSUL_ADDRESS.to_owned()
}
fn default_token_env() -> String {
    "CONSUL_HTTP_TOKEN".to_owned()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}
fn default_max_parallel_revokes() -> usize {
    DEFAULT_MAX_PARALLEL_REVOKES
}

impl Config {
    /// Reject values that would make the facade unusable.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster_id.trim().is_empty() {
            anyhow::bail!("cluster_id must not be empty");
        }
        if self.limits.requests_per_second == 0 {
            anyhow::bail!("limits.requests_per_second must be greater than zero");
        }
        if self.limits.max_parallel_revokes == 0 {
            anyhow::bail!("limits.max_parallel_revokes must be greater than zero");
        }
        if self.consul.request_timeout_secs == 0 {
            anyhow::bail!("consul.request_timeout_secs must be greater than zero");
        }
        parse_base_url(&self.consul.address)
            .map_err(|e| anyhow::anyhow!("consul.address: {e}"))?;
        Ok(())
    }

    /// Facade tunables derived from this config.
    pub fn facade_options(&self) -> FacadeOptions {
        FacadeOptions {
            requests_per_second: self.limits.requests_per_second,
            max_parallel_revokes: self.limits.max_parallel_revokes,
            check_role_policies: self.policy.check_role_policies,
        }
    }

    /// An identity request for a task in this cluster.
    pub fn identity_request(&self, alloc_id: &str, task_name: &str) -> IdentityRequest {
        IdentityRequest::new(self.cluster_id.clone(), alloc_id, task_name)
    }

    /// Read the management token from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or blank.
    pub fn management_token(&self) -> anyhow::Result<String> {
        let value = std::env::var(&self.consul.token_env).map_err(|e| {
            anyhow::anyhow!(
                "failed to read management token from {}: {e}",
                self.consul.token_env
            )
        })?;
        if value.trim().is_empty() {
            anyhow::bail!("management token in {} is empty", self.consul.token_env);
        }
        Ok(value)
    }
}

/// Load and validate the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;
    Ok(config)
}
