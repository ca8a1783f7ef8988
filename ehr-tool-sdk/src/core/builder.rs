//! Client builder implementation
//!
//! Explicit values set on the builder win; anything left unset falls back to
//! the configuration provider (the `EHR_*` environment by default).

use std::sync::Arc;

use crate::auth::TokenCache;
use crate::client::{EhrClient, UserAgent};
use crate::config::{ClientConfig, ConfigProvider, DEFAULT_PROVIDER};
use crate::error::Result;
use crate::resilience::{Sleeper, TokioSleeper};
use crate::telemetry::{self, Instrumentation};

/// Builder for [`EhrClient`]
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    refresh_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    token_url: Option<String>,
    max_retries: Option<u32>,
    timeout_seconds: Option<u64>,
    retry_server_errors: Option<bool>,
    user_agent: Option<UserAgent>,
    config: Option<ClientConfig>,
    provider: Option<Arc<dyn ConfigProvider>>,
    token_cache: Option<Arc<TokenCache>>,
    instrumentation: Option<Arc<dyn Instrumentation>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl ClientBuilder {
    /// Create a new client builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a complete configuration instead of the provider
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Read unset values from `provider` instead of the environment
    pub fn config_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the EHR API base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the practice API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the OAuth refresh token
    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the OAuth client id
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the OAuth client secret
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set the OAuth redirect URI
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the identity provider token endpoint
    pub fn token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    /// Set the retry budget per logical call
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the per-attempt timeout in seconds
    ///
    /// Zero is rejected by [`build`](Self::build).
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Retry 5xx responses with backoff
    pub fn retry_server_errors(mut self, enabled: bool) -> Self {
        self.retry_server_errors = Some(enabled);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    /// Share tokens through `cache` instead of the process-wide cache
    pub fn token_cache(mut self, cache: Arc<TokenCache>) -> Self {
        self.token_cache = Some(cache);
        self
    }

    /// Report calls to `instrumentation` instead of the `COLLECT_METRICS` default
    pub fn instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Wait between retries with `sleeper` instead of the tokio timer
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Resolve the effective configuration without validating it
    pub fn resolve_config(&self) -> ClientConfig {
        let mut config = match (&self.config, &self.provider) {
            (Some(config), _) => config.clone(),
            (None, Some(provider)) => ClientConfig::from_provider(provider.as_ref()),
            (None, None) => ClientConfig::from_provider(&**DEFAULT_PROVIDER),
        };

        let overrides = [
            (&mut config.base_url, &self.base_url),
            (&mut config.api_key, &self.api_key),
            (&mut config.refresh_token, &self.refresh_token),
            (&mut config.client_id, &self.client_id),
            (&mut config.client_secret, &self.client_secret),
            (&mut config.redirect_uri, &self.redirect_uri),
            (&mut config.token_url, &self.token_url),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                *field = value.clone();
            }
        }

        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(seconds) = self.timeout_seconds {
            config.timeout_seconds = seconds;
        }
        if let Some(enabled) = self.retry_server_errors {
            config.retry_server_errors = enabled;
        }

        config
    }

    /// Validate the configuration and build the client
    pub fn build(self) -> Result<EhrClient> {
        EhrClient::from_parts(
            self.resolve_config(),
            self.token_cache.unwrap_or_else(TokenCache::global),
            self.instrumentation.unwrap_or_else(telemetry::from_env),
            self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            self.user_agent.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigProvider;
    use crate::error::ServiceError;

    fn provider() -> Arc<dyn ConfigProvider> {
        let mut provider = MemoryConfigProvider::new();
        provider.set("base_url", "https://ehr.example.com/api/v1");
        provider.set("api_key", "env-key");
        provider.set("refresh_token", "env-refresh");
        provider.set("client_id", "env-client");
        provider.set("client_secret", "env-secret");
        provider.set("token_url", "https://auth.example.com/oauth/token");
        provider.set("max_retries", 5);
        Arc::new(provider)
    }

    #[test]
    fn test_explicit_values_override_provider() {
        let config = ClientBuilder::new()
            .config_provider(provider())
            .client_id("explicit-client")
            .max_retries(1)
            .timeout_seconds(10)
            .resolve_config();

        assert_eq!(config.client_id, "explicit-client");
        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.timeout_seconds, 10);
        assert!(!config.retry_server_errors);
    }

    #[test]
    fn test_provider_values_used_when_unset() {
        let config = ClientBuilder::new().config_provider(provider()).resolve_config();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout_seconds, crate::config::DEFAULT_TIMEOUT_SECONDS);
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let result = ClientBuilder::new()
            .config_provider(provider())
            .timeout_seconds(0)
            .build();

        match result {
            Err(ServiceError::Configuration(message)) => {
                assert_eq!(message, "timeout_seconds must be at least 1");
            }
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_rejects_missing_credentials() {
        let result = ClientBuilder::new()
            .config_provider(Arc::new(MemoryConfigProvider::new()))
            .base_url("https://ehr.example.com")
            .token_url("https://auth.example.com/token")
            .api_key("key")
            .build();

        match result {
            Err(ServiceError::Configuration(message)) => {
                assert!(message.contains("refresh_token"));
                assert!(message.contains("client_id"));
                assert!(message.contains("client_secret"));
                assert!(!message.contains("api_key"));
            }
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }
}
