use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use super::token::{CachedToken, DEFAULT_EXPIRES_IN_SECS};
use crate::config::ClientConfig;
use crate::error::{Result, ServiceError};
use crate::util::{sanitize_for_logging, truncate_string};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<serde_json::Value>,
    scope: Option<String>,
}

/// Performs the OAuth2 refresh-token grant against the identity provider
#[derive(Clone)]
pub struct TokenRefresher {
    http_client: Client,
    token_url: String,
    refresh_token: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TokenRefresher {
    /// Create a refresher with its own HTTP client
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ServiceError::configuration(format!("Failed to build token HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            token_url: config.token_url.clone(),
            refresh_token: config.refresh_token.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// Exchange the refresh token for a new bearer token
    ///
    /// Failures are terminal: a non-2xx status, an unreachable endpoint or a
    /// response without `access_token` all return `ServiceError::Authentication`.
    pub async fn refresh(&self) -> Result<CachedToken> {
        info!(client_id = %self.client_id, "Refreshing EHR API token");

        let params = [
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .query(&params)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Token endpoint unreachable");
                ServiceError::authentication(format!("Token refresh request failed: {}", e))
            })?;

        let issued_at = Utc::now();
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                ServiceError::authentication(format!("Failed to read token response: {}", e))
            })?;

        if !status.is_success() {
            error!(
                status = status.as_u16(),
                body = %truncate_string(&sanitize_for_logging(&body), 200),
                "Failed to refresh token"
            );
            return Err(ServiceError::authentication(format!(
                "Token refresh failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let payload: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ServiceError::authentication(format!("Invalid token response: {}", e))
        })?;

        let access_token = payload
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                error!("Token response did not include an access token");
                ServiceError::authentication(format!(
                    "Failed to obtain new token with response: {}",
                    sanitize_for_logging(&body)
                ))
            })?;

        let expires_in = payload
            .expires_in
            .as_ref()
            .and_then(expires_in_secs)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let scope_count = payload
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().count())
            .unwrap_or(0);

        info!(expires_in, scopes = scope_count, "Token refreshed successfully");

        Ok(CachedToken::issued(access_token, issued_at, expires_in))
    }
}

fn expires_in_secs(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
