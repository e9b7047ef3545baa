//! Subjects and results of service identity token operations.

use serde::{Deserialize, Serialize};

use crate::error::AclError;

/// Identifies the workload a service identity token is minted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityRequest {
    /// Cluster the orchestrator belongs to.
    pub cluster_id: String,
    /// Allocation (scheduled workload instance) id.
    pub alloc_id: String,
    /// Task name; also the single service the token is scoped to.
    pub task_name: String,
}

impl IdentityRequest {
    /// Build a request from its three parts.
    pub fn new(
        cluster_id: impl Into<String>,
        alloc_id: impl Into<String>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            alloc_id: alloc_id.into(),
            task_name: task_name.into(),
        }
    }

    /// Check that every field is set.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Validation`] naming the first empty field.
    pub fn validate(&self) -> Result<(), AclError> {
        let missing = if self.cluster_id.is_empty() {
            "cluster id"
        } else if self.alloc_id.is_empty() {
            "alloc id"
        } else if self.task_name.is_empty() {
            "task name"
        } else {
            return Ok(());
        };
        Err(AclError::Validation(format!("{missing} not set")))
    }

    /// Audit description stored on the created token.
    ///
    /// Format is `_si [<cluster>] [<alloc>] [<task>]`. Log tooling parses
    /// it; do not change it.
    pub fn description(&self) -> String {
        format!(
            "_si [{}] [{}] [{}]",
            self.cluster_id, self.alloc_id, self.task_name
        )
    }
}

/// A freshly minted service identity token.
///
/// Ownership passes to the caller; nothing here stores it.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Task the token was minted for.
    pub task_name: String,
    /// Public accessor id, safe to log.
    pub accessor_id: String,
    /// Secret credential. Never log this.
    pub secret_id: String,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("task_name", &self.task_name)
            .field("accessor_id", &self.accessor_id)
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

/// A previously issued token to revoke, with context for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevocationTarget {
    /// Accessor id of the token to delete.
    pub accessor_id: String,
    /// Task the token was minted for.
    pub task_name: String,
    /// Allocation the task belonged to.
    pub alloc_id: String,
    /// Node the allocation ran on.
    pub node_id: String,
}

impl RevocationTarget {
    /// Describe a token to revoke.
    pub fn new(
        accessor_id: impl Into<String>,
        task_name: impl Into<String>,
        alloc_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            accessor_id: accessor_id.into(),
            task_name: task_name.into(),
            alloc_id: alloc_id.into(),
            node_id: node_id.into(),
        }
    }

    /// Check that the target names a token.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Validation`] if the accessor id is blank.
    pub fn validate(&self) -> Result<(), AclError> {
        if self.accessor_id.trim().is_empty() {
            return Err(AclError::Validation(format!(
                "accessor id not set for task {:?}",
                self.task_name
            )));
        }
        Ok(())
    }
}
