//! Error mapping for tool-facing results
//!
//! Tools hand JSON back to the host, so terminal failures are folded into a
//! single `{"error": "<message>"}` shape that looks like an API error
//! response to the caller.

use reqwest::StatusCode;
use serde_json::{json, Value};

use super::ServiceError;

/// Build the `{"error": ...}` payload for a terminal attempt failure
pub fn error_payload(err: &ServiceError) -> Value {
    let message = match err {
        ServiceError::Http { .. } => err.to_string(),
        ServiceError::Network(detail) | ServiceError::Timeout(detail) => {
            format!("Request failed: {}", detail)
        }
        ServiceError::Parsing(detail) | ServiceError::Internal(detail) => {
            format!("Unexpected error: {}", detail)
        }
        other => format!("Unexpected error: {}", other),
    };

    json!({ "error": message })
}

/// Helper function to classify HTTP errors by category
pub fn classify_http_error(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "validation",
        401 => "authentication",
        403 => "authorization",
        404 => "not_found",
        408 => "timeout",
        429 => "rate_limit",
        500..=599 => "server",
        _ => "unknown",
    }
}

/// Server-side statuses eligible for retry when the client opts in
pub fn is_retryable_server_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503 | 504)
}
