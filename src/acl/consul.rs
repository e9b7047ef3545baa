//! Consul ACL backend using the `/v1/acl/*` HTTP API.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    check_http_response, AclApi, AclPolicy, AclRole, ApiError, CreatedToken, NewServiceToken,
    TokenListEntry, TokenSelf,
};

/// Default Consul HTTP API address.
pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";

/// Header carrying the ACL token on every request.
pub const TOKEN_HEADER: &str = "X-Consul-Token";

/// Consul ACL API client.
///
/// Requests other than [`AclApi::read_token_self`] authenticate with the
/// operator's management token; `read_token_self` authenticates with the
/// credential being resolved.
#[derive(Clone)]
pub struct ConsulAclClient {
    base_url: Url,
    management_token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ConsulAclClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulAclClient")
            .field("base_url", &self.base_url.as_str())
            .field("management_token", &"[REDACTED]")
            .finish()
    }
}

impl ConsulAclClient {
    /// Create a client for the Consul agent at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Other`] if `address` is not an absolute http(s)
    /// URL, or [`ApiError::Request`] if the HTTP client cannot be built.
    pub fn new(
        address: &str,
        management_token: String,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = parse_base_url(address)?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url,
            management_token,
            client,
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build an API URL from path segments beneath the base URL.
    ///
    /// Each segment is percent-encoded, so `/`, `?` and `#` inside an id
    /// stay inside that segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::Other(format!("ACL base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &[&str],
        token: &str,
        missing: &str,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.endpoint(path)?)
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(missing.to_owned()));
        }
        let body = check_http_response(response).await?;
        parse_body(&body)
    }
}

/// Reject ids that would not address a single ACL object.
fn object_id<'a>(kind: &str, id: &'a str) -> Result<&'a str, ApiError> {
    match id.trim() {
        "" | "." | ".." => Err(ApiError::Other(format!("invalid {kind} id {id:?}"))),
        _ => Ok(id),
    }
}

/// Parse and validate a Consul base URL.
///
/// A trailing slash is added so relative API paths join beneath any path
/// prefix the address carries.
#[doc(hidden)]
pub fn parse_base_url(address: &str) -> Result<Url, ApiError> {
    let mut normalized = address.trim().to_owned();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| ApiError::Other(format!("invalid Consul address {address:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::Other(format!(
            "unsupported Consul address scheme {other:?}"
        ))),
    }
}

/// Deserialize a JSON response body.
///
/// # Errors
///
/// Returns `ApiError::Parse` if the body does not match `T`.
#[doc(hidden)]
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl AclApi for ConsulAclClient {
    async fn read_token_self(&self, credential: &str) -> Result<TokenSelf, ApiError> {
        self.get_json(&["v1", "acl", "token", "self"], credential, "token")
            .await
    }

    async fn read_policy(&self, policy_id: &str) -> Result<AclPolicy, ApiError> {
        let id = object_id("policy", policy_id)?;
        self.get_json(
            &["v1", "acl", "policy", id],
            &self.management_token,
            &format!("policy {policy_id}"),
        )
        .await
    }

    async fn read_role(&self, role_id: &str) -> Result<AclRole, ApiError> {
        let id = object_id("role", role_id)?;
        self.get_json(
            &["v1", "acl", "role", id],
            &self.management_token,
            &format!("role {role_id}"),
        )
        .await
    }

    async fn create_token(&self, request: &NewServiceToken) -> Result<CreatedToken, ApiError> {
        let response = self
            .client
            .put(self.endpoint(&["v1", "acl", "token"])?)
            .header(TOKEN_HEADER, &self.management_token)
            .json(request)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        parse_body(&body)
    }

    async fn delete_token(&self, accessor_id: &str) -> Result<(), ApiError> {
        let id = object_id("accessor", accessor_id)?;
        let response = self
            .client
            .delete(self.endpoint(&["v1", "acl", "token", id])?)
            .header(TOKEN_HEADER, &self.management_token)
            .send()
            .await?;
        // Already gone counts as revoked.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_http_response(response).await?;
        Ok(())
    }

    async fn list_tokens(&self) -> Result<Vec<TokenListEntry>, ApiError> {
        self.get_json(&["v1", "acl", "tokens"], &self.management_token, "tokens")
            .await
    }
}
