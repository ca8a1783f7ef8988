use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens closer than this to expiry are treated as stale
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 300;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Key under which a bearer token is cached and its refresh serialised
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Identity used for instrumentation outside any client context
    pub const UNKNOWN: &'static str = "unknown";

    /// Create an identity from an OAuth client id
    pub fn new(client_id: impl Into<String>) -> Self {
        Self(client_id.into())
    }

    /// Placeholder identity for calls made outside a client context
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    /// Borrow the identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A bearer token and the instant it stops being accepted
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// Bearer token presented on every API call
    pub bearer_token: String,

    /// Absolute expiry reported by the identity provider
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Create a cached token with an absolute expiry
    pub fn new(bearer_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            expires_at,
        }
    }

    /// Create a cached token from an `expires_in` lifetime measured from `issued_at`
    pub fn issued(
        bearer_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
    ) -> Self {
        Self::new(bearer_token, issued_at + Duration::seconds(expires_in_secs))
    }

    /// Whether the token stays valid beyond the safety margin at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(TOKEN_SAFETY_MARGIN_SECS)
    }

    /// Whether the token stays valid beyond the safety margin right now
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("bearer_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
