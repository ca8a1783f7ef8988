use std::fmt;

use reqwest::{header, Client};

use crate::config::ClientConfig;
use crate::error::{Result, ServiceError};

/// UserAgent structure for identifying the client to the EHR API
#[derive(Debug, Clone)]
pub struct UserAgent {
    /// Application name
    pub app_name: String,

    /// Version string
    pub version: String,

    /// Optional extra info
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "ehr-tool-sdk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: None,
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;

        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }

        Ok(())
    }
}

/// Build the per-client HTTP transport
///
/// Headers that never change for a client are installed as defaults; the
/// bearer token is added per attempt.
pub(crate) fn build_http_client(config: &ClientConfig, user_agent: &UserAgent) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&user_agent.to_string())
            .map_err(|e| ServiceError::configuration(format!("Invalid user agent: {}", e)))?,
    );
    headers.insert(
        "api_key",
        header::HeaderValue::from_str(&config.api_key)
            .map_err(|e| {
                ServiceError::configuration(format!("Invalid api_key header value: {}", e))
            })?,
    );
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));

    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout())
        .gzip(true)
        .build()
        .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
}
