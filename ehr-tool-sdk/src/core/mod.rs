//! Core abstractions for the EHR Tool SDK
//!
//! - `RequestExecutor`: one logical API call with retries, plus verb helpers
//! - `AuthenticatedClient`: bearer token lookup, header application and
//!   invalidation of tokens the API rejected
//! - `ClientBuilder`: builder pattern for creating clients

pub mod builder;
pub use builder::ClientBuilder;

use std::fmt;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::auth::ClientIdentity;
use crate::client::QueryParams;
use crate::error::Result;

/// HTTP methods supported by the EHR API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Upper-case method name used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a JSON body is sent with this method
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Trait responsible for executing EHR API requests
///
/// `Ok` carries either the decoded response body or an `{"error": ...}`
/// object describing a terminal failure. `Err` means the client cannot make
/// calls at all: the token endpoint refused the refresh grant, or the
/// session was released.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Execute one logical call, retrying within the client's budget
    async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Option<&QueryParams>,
        body: Option<&Value>,
    ) -> Result<Value>;

    /// Execute a GET request
    async fn get(&self, endpoint: &str, params: Option<&QueryParams>) -> Result<Value> {
        self.execute(HttpMethod::Get, endpoint, params, None).await
    }

    /// Execute a POST request
    async fn post(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        params: Option<&QueryParams>,
    ) -> Result<Value> {
        self.execute(HttpMethod::Post, endpoint, params, body).await
    }

    /// Execute a PUT request
    async fn put(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        params: Option<&QueryParams>,
    ) -> Result<Value> {
        self.execute(HttpMethod::Put, endpoint, params, body).await
    }

    /// Execute a DELETE request
    async fn delete(&self, endpoint: &str, params: Option<&QueryParams>) -> Result<Value> {
        self.execute(HttpMethod::Delete, endpoint, params, None).await
    }
}

/// Trait for clients that authenticate with a refreshable bearer token
#[async_trait]
pub trait AuthenticatedClient: Send + Sync {
    /// Authentication scheme placed in the `Authorization` header
    fn auth_type(&self) -> &str {
        "Bearer"
    }

    /// Identity the client's tokens are cached under
    fn identity(&self) -> &ClientIdentity;

    /// A token valid beyond the safety margin, refreshing if needed
    async fn bearer_token(&self) -> Result<String>;

    /// Add authentication headers for `token` to a request
    fn apply_auth(&self, token: &str, headers: &mut HeaderMap) -> Result<()>;

    /// Drop a token the API rejected so the next lookup refreshes
    async fn invalidate_auth(&self, rejected_token: &str);
}
