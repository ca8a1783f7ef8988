//! Call instrumentation for tools and outbound API calls
//!
//! The SDK does not export telemetry. It reports four fire-and-forget events
//! through [`Instrumentation`]; the host decides where they go. Every event
//! is a no-op when instrumentation is disabled.
//!
//! Two helpers are part of the contract because they decide how calls are
//! grouped and counted: [`sanitize_endpoint`] collapses resource IDs out of
//! metric labels, and [`is_successful_response`] classifies tool results.

mod context;
pub mod logging;
mod recorder;

pub use self::context::{current_client_identity, instrument_tool, set_client_context};
pub use self::recorder::MetricsInstrumentation;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::auth::ClientIdentity;
use crate::core::HttpMethod;

/// Outcome reported when a tool call completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// The tool returned a successful response
    Success,
    /// The tool returned an error-shaped response
    Failure,
    /// The tool body panicked or was cancelled
    Error,
}

impl CallStatus {
    /// Label value used in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability hooks invoked around tool calls and API attempts
pub trait Instrumentation: Send + Sync {
    /// A tool invocation started
    fn tool_call_started(&self, tool_name: &str, identity: &ClientIdentity);

    /// A tool invocation finished
    fn tool_call_completed(
        &self,
        tool_name: &str,
        identity: &ClientIdentity,
        status: CallStatus,
        duration: Duration,
    );

    /// A physical API attempt started
    fn api_call_started(&self, identity: &ClientIdentity, endpoint: &str, method: HttpMethod);

    /// A physical API attempt finished
    fn api_call_completed(
        &self,
        identity: &ClientIdentity,
        endpoint: &str,
        method: HttpMethod,
        duration: Duration,
        success: bool,
    );
}

/// Instrumentation that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {
    fn tool_call_started(&self, _tool_name: &str, _identity: &ClientIdentity) {}

    fn tool_call_completed(
        &self,
        _tool_name: &str,
        _identity: &ClientIdentity,
        _status: CallStatus,
        _duration: Duration,
    ) {
    }

    fn api_call_started(&self, _identity: &ClientIdentity, _endpoint: &str, _method: HttpMethod) {}

    fn api_call_completed(
        &self,
        _identity: &ClientIdentity,
        _endpoint: &str,
        _method: HttpMethod,
        _duration: Duration,
        _success: bool,
    ) {
    }
}

/// Pick instrumentation from `COLLECT_METRICS` (`true`, `1` or `yes` enables metrics)
pub fn from_env() -> Arc<dyn Instrumentation> {
    let enabled = std::env::var("COLLECT_METRICS")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    if enabled {
        Arc::new(MetricsInstrumentation::new())
    } else {
        Arc::new(NoopInstrumentation)
    }
}

/// Strip 18-digit resource IDs from an endpoint so metrics group by route shape
///
/// `/patients/123456789012345678/vitals` becomes `/patients/vitals`. The
/// result is only ever used as a label, never for routing.
pub fn sanitize_endpoint(endpoint: &str) -> String {
    endpoint
        .split('/')
        .filter(|segment| !is_resource_id(segment))
        .collect::<Vec<_>>()
        .join("/")
}

fn is_resource_id(segment: &str) -> bool {
    segment.len() == 18 && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Classify a tool or API response as success or failure
///
/// A response fails when it is not a JSON object, carries an `error` key,
/// has a `code` that is a string mentioning "error" or a number of 400 and
/// above, or has a `message` mentioning "error", "failed" or "failure".
pub fn is_successful_response(response: &Value) -> bool {
    let Some(object) = response.as_object() else {
        return false;
    };

    if object.contains_key("error") {
        return false;
    }

    match object.get("code") {
        Some(Value::String(code)) if code.to_lowercase().contains("error") => return false,
        Some(Value::Number(code)) if code.as_f64().map_or(false, |c| c >= 400.0) => return false,
        _ => {}
    }

    if let Some(Value::String(message)) = object.get("message") {
        let message = message.to_lowercase();
        if ["error", "failed", "failure"].iter().any(|word| message.contains(word)) {
            return false;
        }
    }

    true
}

/// Reports `api_call_completed` exactly once when dropped
///
/// Created at the start of every physical attempt, so the completion event
/// fires on success, on error returns and during unwinding alike.
pub(crate) struct ApiCallGuard {
    instrumentation: Arc<dyn Instrumentation>,
    identity: ClientIdentity,
    endpoint: String,
    method: HttpMethod,
    start: Instant,
    success: bool,
}

impl ApiCallGuard {
    pub(crate) fn start(
        instrumentation: Arc<dyn Instrumentation>,
        identity: ClientIdentity,
        endpoint: String,
        method: HttpMethod,
    ) -> Self {
        instrumentation.api_call_started(&identity, &endpoint, method);
        Self {
            instrumentation,
            identity,
            endpoint,
            method,
            start: Instant::now(),
            success: false,
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.success = true;
    }
}

impl Drop for ApiCallGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        context::record_api_outcome(self.success);
        self.instrumentation.api_call_completed(
            &self.identity,
            &self.endpoint,
            self.method,
            duration,
            self.success,
        );
    }
}
