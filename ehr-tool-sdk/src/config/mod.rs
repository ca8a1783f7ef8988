//! Configuration management for the EHR client
//!
//! Values are resolved from explicit builder overrides first and from the
//! environment second. The environment is read through a `ConfigProvider` so
//! tests can substitute an in-memory provider.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ServiceError};

/// Default retry budget shared by the 401 and transport-error paths
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<i64>()
            .map_err(|e| {
                ServiceError::configuration(format!("Invalid integer for key {}: {}", key, e))
            })
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ServiceError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get an optional string, treating blank values as absent
    fn get_string_opt(&self, key: &str) -> Option<String> {
        self.get_string(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// Get an integer configuration value with a default
    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a boolean configuration value with a default
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Load a `.env` file from the working directory, if one exists
    pub fn load_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded environment file");
        }
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                ServiceError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => ServiceError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| {
                ServiceError::configuration(format!("Configuration key not found: {}", key))
            })
    }
}

/// Global default configuration provider (`EHR_*` variables, `.env` aware)
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> =
    Lazy::new(|| Arc::new(EnvConfigProvider::new().with_prefix("EHR").load_dotenv()));

/// Trait for service-specific configuration
pub trait ServiceConfig: fmt::Debug + Send + Sync {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;

    /// Service name
    fn service_name(&self) -> &str;
}

/// Connection and credential settings for one EHR client instance
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the EHR REST API
    pub base_url: String,

    /// Practice API key sent as the `api_key` header
    pub api_key: String,

    /// Long-lived OAuth refresh token
    pub refresh_token: String,

    /// OAuth client id; also the token cache identity
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI registered with the identity provider
    pub redirect_uri: String,

    /// Identity provider token endpoint
    pub token_url: String,

    /// Retry budget per logical call
    pub max_retries: u32,

    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,

    /// Retry 5xx responses with backoff instead of surfacing them
    pub retry_server_errors: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            refresh_token: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            token_url: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            retry_server_errors: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("max_retries", &self.max_retries)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_server_errors", &self.retry_server_errors)
            .finish()
    }
}

impl ClientConfig {
    /// Load defaults from a config provider without validating them
    ///
    /// Missing values stay empty so explicit overrides can still fill them in
    /// before `validate` runs.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Self {
        let text = |key: &str| provider.get_string_opt(key).unwrap_or_default();

        let max_retries = provider.get_int_or("max_retries", i64::from(DEFAULT_MAX_RETRIES));
        let timeout_seconds =
            provider.get_int_or("timeout_seconds", DEFAULT_TIMEOUT_SECONDS as i64);

        Self {
            base_url: text("base_url"),
            api_key: text("api_key"),
            refresh_token: text("refresh_token"),
            client_id: text("client_id"),
            client_secret: text("client_secret"),
            redirect_uri: text("redirect_uri"),
            token_url: text("token_url"),
            max_retries: u32::try_from(max_retries).unwrap_or(DEFAULT_MAX_RETRIES),
            timeout_seconds: u64::try_from(timeout_seconds)
                .ok()
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            retry_server_errors: provider.get_bool_or("retry_server_errors", false),
        }
    }

    /// Load from the process environment (`EHR_*`)
    pub fn from_env() -> Self {
        Self::from_provider(&**DEFAULT_PROVIDER)
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ServiceConfig for ClientConfig {
    fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("api_key", &self.api_key),
            ("refresh_token", &self.refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ServiceError::configuration(format!(
                "Missing required EHR API credentials: {}",
                missing.join(", ")
            )));
        }

        for (name, value) in [("base_url", &self.base_url), ("token_url", &self.token_url)] {
            Url::parse(value).map_err(|e| {
                ServiceError::configuration(format!("Invalid {} '{}': {}", name, value, e))
            })?;
        }

        if self.timeout_seconds == 0 {
            return Err(ServiceError::configuration("timeout_seconds must be at least 1"));
        }

        Ok(())
    }

    fn service_name(&self) -> &str {
        "ehr"
    }
}
