use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use tracing::{debug, info};

use super::{CallStatus, Instrumentation};
use crate::auth::ClientIdentity;
use crate::core::HttpMethod;

static DESCRIBE: Once = Once::new();

fn describe_metrics() {
    describe_counter!(
        "ehr_tool_calls_total",
        "Total number of tool calls by tool name, client ID and status"
    );
    describe_histogram!(
        "ehr_tool_duration_seconds",
        "Duration of tool calls by tool name and client ID"
    );
    describe_gauge!("ehr_tool_calls_current", "Current tool call status (1=call active, 0=idle)");
    describe_gauge!("ehr_tool_success_rate", "Success rate of tool calls (0.0-1.0)");
    describe_counter!(
        "ehr_api_calls_total",
        "Total number of EHR API attempts by endpoint, method and status"
    );
    describe_gauge!("ehr_api_calls_current", "Current API call status (1=call active, 0=idle)");
    describe_gauge!("ehr_api_latency_seconds", "Latency of the most recent API attempt");
}

/// Instrumentation that records through the `metrics` facade
///
/// Exporting is left to whichever recorder the host installs; without one
/// every call is a cheap no-op.
#[derive(Debug, Default)]
pub struct MetricsInstrumentation {
    tool_calls: AtomicU64,
    successful_tool_calls: AtomicU64,
}

impl MetricsInstrumentation {
    /// Create the instrumentation and register metric descriptions
    pub fn new() -> Self {
        DESCRIBE.call_once(describe_metrics);
        Self::default()
    }

    /// Fraction of completed tool calls that succeeded
    pub fn success_rate(&self) -> f64 {
        let total = self.tool_calls.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.successful_tool_calls.load(Ordering::Relaxed) as f64 / total as f64
    }
}

impl Instrumentation for MetricsInstrumentation {
    fn tool_call_started(&self, tool_name: &str, identity: &ClientIdentity) {
        gauge!(
            "ehr_tool_calls_current",
            "tool_name" => tool_name.to_string(),
            "client_id" => identity.to_string()
        )
        .set(1.0);
    }

    fn tool_call_completed(
        &self,
        tool_name: &str,
        identity: &ClientIdentity,
        status: CallStatus,
        duration: Duration,
    ) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        if status == CallStatus::Success {
            self.successful_tool_calls.fetch_add(1, Ordering::Relaxed);
        }
        let success_rate = self.success_rate();

        counter!(
            "ehr_tool_calls_total",
            "tool_name" => tool_name.to_string(),
            "client_id" => identity.to_string(),
            "status" => status.as_str()
        )
        .increment(1);
        histogram!(
            "ehr_tool_duration_seconds",
            "tool_name" => tool_name.to_string(),
            "client_id" => identity.to_string()
        )
        .record(duration.as_secs_f64());
        gauge!(
            "ehr_tool_calls_current",
            "tool_name" => tool_name.to_string(),
            "client_id" => identity.to_string()
        )
        .set(0.0);
        gauge!(
            "ehr_tool_success_rate",
            "tool_name" => tool_name.to_string(),
            "client_id" => identity.to_string()
        )
        .set(success_rate);

        info!(
            tool = tool_name,
            client_id = %identity,
            status = %status,
            duration_secs = duration.as_secs_f64(),
            success_rate,
            "Tool call recorded"
        );
    }

    fn api_call_started(&self, identity: &ClientIdentity, endpoint: &str, method: HttpMethod) {
        gauge!(
            "ehr_api_calls_current",
            "api_endpoint" => endpoint.to_string(),
            "method" => method.as_str(),
            "client_id" => identity.to_string()
        )
        .set(1.0);
    }

    fn api_call_completed(
        &self,
        identity: &ClientIdentity,
        endpoint: &str,
        method: HttpMethod,
        duration: Duration,
        success: bool,
    ) {
        let status = if success { "success" } else { "failure" };

        counter!(
            "ehr_api_calls_total",
            "api_endpoint" => endpoint.to_string(),
            "method" => method.as_str(),
            "client_id" => identity.to_string(),
            "status" => status
        )
        .increment(1);
        gauge!(
            "ehr_api_latency_seconds",
            "api_endpoint" => endpoint.to_string(),
            "method" => method.as_str(),
            "client_id" => identity.to_string()
        )
        .set(duration.as_secs_f64());
        gauge!(
            "ehr_api_calls_current",
            "api_endpoint" => endpoint.to_string(),
            "method" => method.as_str(),
            "client_id" => identity.to_string()
        )
        .set(0.0);

        debug!(
            api_endpoint = endpoint,
            method = %method,
            client_id = %identity,
            status,
            duration_secs = duration.as_secs_f64(),
            "API call recorded"
        );
    }
}
