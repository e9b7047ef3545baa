//! Error taxonomy for service identity token operations.
//!
//! Callers can tell a misconfigured policy ([`AclError::PermissionDenied`],
//! [`AclError::Validation`], [`AclError::Parse`]) apart from an unreachable
//! or failing ACL service ([`AclError::Upstream`]). Nothing in this crate
//! retries; retry policy belongs to the caller.

use crate::acl::ApiError;
use crate::policy::ParseError;

/// Errors returned by the facade and its sub-operations.
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    /// Malformed local input. Never causes a network call.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Raw rule text is malformed or yields an empty rule model.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The administrative credential lacks write permission for the task.
    #[error("permission denied for {task:?}")]
    PermissionDenied {
        /// Task (service) name that was checked.
        task: String,
    },

    /// The external ACL service failed.
    #[error("{op} failed{}: {source}", accessor_suffix(.accessor))]
    Upstream {
        /// Operation that failed (e.g. `delete_token`).
        op: &'static str,
        /// Accessor id involved, for revocation failures.
        accessor: Option<String>,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },

    /// Operation intentionally not supported by the configured backend.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

fn accessor_suffix(accessor: &Option<String>) -> String {
    match accessor {
        Some(id) => format!(" for accessor {id}"),
        None => String::new(),
    }
}

impl AclError {
    /// Wrap an API failure with the operation that produced it.
    pub fn upstream(op: &'static str, source: ApiError) -> Self {
        Self::Upstream {
            op,
            accessor: None,
            source,
        }
    }

    /// Wrap an API failure tied to a specific token accessor.
    pub fn upstream_for(op: &'static str, accessor: &str, source: ApiError) -> Self {
        Self::Upstream {
            op,
            accessor: Some(accessor.to_owned()),
            source,
        }
    }

    /// Whether the error came from the external ACL service.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    /// Whether the error is a cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = AclError> = std::result::Result<T, E>;
