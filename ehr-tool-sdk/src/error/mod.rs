//! Error handling for the EHR Tool SDK
//!
//! Most operational failures never surface as `Err`: the request executor
//! folds them into an `{"error": ...}` JSON value. `ServiceError` is what
//! the SDK raises when a client is unusable (bad configuration, a token
//! endpoint that refuses the refresh grant, a released session) and what the
//! executor uses internally to classify attempt outcomes.

use thiserror::Error;

pub mod mapping;

/// Result type for EHR Tool SDK operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Main error type for the EHR Tool SDK
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Missing or invalid client configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The identity provider refused to issue a token
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Connection level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Non-2xx response from the EHR API
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Response body could not be read or decoded
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// The client session was released and the transport closed
    #[error("Client released: {0}")]
    ClientReleased(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    /// Create an HTTP status error
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            body: body.into(),
        }
    }

    /// Create a parsing error
    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    /// Create a released-client error
    pub fn client_released(message: impl Into<String>) -> Self {
        ServiceError::ClientReleased(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transport failures that the executor retries with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Network(_) | ServiceError::Timeout(_))
    }

    /// Check if this is a permanent error (not retryable)
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }
}

/// Convert reqwest errors to ServiceError
///
/// Timeouts and connection failures, including those hit while reading a
/// body, map to the retryable variants.
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() || err.is_request() || err.is_redirect() {
            ServiceError::network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ServiceError::parsing(format!("Response decode error: {}", err))
        } else if err.is_builder() {
            ServiceError::internal(format!("Invalid request: {}", err))
        } else {
            ServiceError::network(err.to_string())
        }
    }
}

/// Convert serde_json errors to ServiceError
impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
    }
}
