//! External ACL service abstraction.
//!
//! Defines the [`AclApi`] trait consumed by the issuer, revoker, and policy
//! evaluator, plus the request/response types exchanged with it.
//!
//! One backend is implemented:
//! - [`consul::ConsulAclClient`] for the Consul `/v1/acl/*` HTTP API

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod consul;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Reference to a policy or role attached to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Identifier used for lookups.
    #[serde(rename = "ID")]
    pub id: String,
    /// Human-readable name.
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// The token a credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenSelf {
    /// Public accessor id of the credential.
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    /// Policies attached directly to the token.
    #[serde(rename = "Policies", default, deserialize_with = "null_as_empty")]
    pub policies: Vec<Link>,
    /// Roles attached to the token.
    #[serde(rename = "Roles", default, deserialize_with = "null_as_empty")]
    pub roles: Vec<Link>,
}

/// An ACL policy and its raw rule text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AclPolicy {
    /// Policy id.
    #[serde(rename = "ID")]
    pub id: String,
    /// Policy name.
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Raw rule text.
    #[serde(rename = "Rules", default)]
    pub rules: String,
}

/// An ACL role and the policies it grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AclRole {
    /// Role id.
    #[serde(rename = "ID")]
    pub id: String,
    /// Role name.
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Policies linked to the role.
    #[serde(rename = "Policies", default, deserialize_with = "null_as_empty")]
    pub policies: Vec<Link>,
}

/// A service identity scoping a token to a single service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceIdentity {
    /// Service the token may register and discover as.
    #[serde(rename = "ServiceName")]
    pub service_name: String,
}

/// Request body for a new service identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewServiceToken {
    /// Audit description, see [`crate::identity::IdentityRequest::description`].
    #[serde(rename = "Description")]
    pub description: String,
    /// Exactly one service identity.
    #[serde(rename = "ServiceIdentities")]
    pub service_identities: Vec<ServiceIdentity>,
}

impl NewServiceToken {
    /// A token request scoped to exactly `service_name`.
    pub fn for_service(description: String, service_name: &str) -> Self {
        Self {
            description,
            service_identities: vec![ServiceIdentity {
                service_name: service_name.to_owned(),
            }],
        }
    }
}

/// Identifiers of a freshly created token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedToken {
    /// Public accessor id.
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    /// Secret id. Never logged.
    #[serde(rename = "SecretID")]
    pub secret_id: String,
}

impl std::fmt::Debug for CreatedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedToken")
            .field("accessor_id", &self.accessor_id)
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

/// One row of the token listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenListEntry {
    /// Public accessor id.
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    /// Token description.
    #[serde(rename = "Description", default)]
    pub description: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by ACL backends.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP transport failure.
    #[error("ACL request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("ACL response parse error: {0}")]
    Parse(String),
    /// The ACL service responded with an error status.
    #[error("ACL service returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// The looked-up object does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend does not support this operation.
    #[error("operation not supported by this ACL backend")]
    Unsupported,
    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ApiError::Request` on transport failure, `ApiError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, redact UUID-shaped ids, and truncate an error body.
///
/// ACL secrets are UUIDs; an error body echoing one must not reach logs.
#[doc(hidden)]
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        r"(?i)x-consul-token:\s*\S+",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Logical operations consumed from the external ACL service.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// concurrent caller. Implementations do not rate limit; callers acquire a
/// [`crate::limiter::RateLimiter`] permit before each call.
#[async_trait]
pub trait AclApi: Send + Sync {
    /// Resolve `credential` to its token and attached policies and roles.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on lookup or transport failure.
    async fn read_token_self(&self, credential: &str) -> Result<TokenSelf, ApiError>;

    /// Fetch a policy and its raw rule text.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on lookup or transport failure.
    async fn read_policy(&self, policy_id: &str) -> Result<AclPolicy, ApiError>;

    /// Fetch a role and its linked policies.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on lookup or transport failure.
    async fn read_role(&self, role_id: &str) -> Result<AclRole, ApiError>;

    /// Create a token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or rejection.
    async fn create_token(&self, request: &NewServiceToken) -> Result<CreatedToken, ApiError>;

    /// Delete a token by accessor id. Deleting an unknown accessor succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or rejection.
    async fn delete_token(&self, accessor_id: &str) -> Result<(), ApiError>;

    /// List every token known to the service.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unsupported`] unless the backend overrides it.
    async fn list_tokens(&self) -> Result<Vec<TokenListEntry>, ApiError> {
        Err(ApiError::Unsupported)
    }
}
