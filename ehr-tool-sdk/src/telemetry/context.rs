use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use super::{is_successful_response, CallStatus, Instrumentation};
use crate::auth::ClientIdentity;

#[derive(Debug, Default)]
struct ToolContext {
    identity: Option<ClientIdentity>,
    api_calls: u32,
    successful_api_calls: u32,
}

tokio::task_local! {
    static TOOL_CONTEXT: RefCell<ToolContext>;
}

/// Label API metrics inside the current tool call with `identity`
///
/// Outside an [`instrument_tool`] scope this does nothing.
pub fn set_client_context(identity: &ClientIdentity) {
    let _ = TOOL_CONTEXT.try_with(|ctx| ctx.borrow_mut().identity = Some(identity.clone()));
}

/// Identity set by the client acquired in the current tool call, or `unknown`
pub fn current_client_identity() -> ClientIdentity {
    TOOL_CONTEXT
        .try_with(|ctx| ctx.borrow().identity.clone())
        .ok()
        .flatten()
        .unwrap_or_else(ClientIdentity::unknown)
}

pub(crate) fn record_api_outcome(success: bool) {
    let _ = TOOL_CONTEXT.try_with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.api_calls += 1;
        if success {
            ctx.successful_api_calls += 1;
        }
    });
}

fn api_call_counts() -> (u32, u32) {
    TOOL_CONTEXT
        .try_with(|ctx| {
            let ctx = ctx.borrow();
            (ctx.api_calls, ctx.successful_api_calls)
        })
        .unwrap_or((0, 0))
}

struct ToolCallGuard {
    instrumentation: Arc<dyn Instrumentation>,
    tool_name: String,
    start: Instant,
    status: Option<CallStatus>,
}

impl ToolCallGuard {
    fn start(instrumentation: Arc<dyn Instrumentation>, tool_name: String) -> Self {
        instrumentation.tool_call_started(&tool_name, &current_client_identity());
        Self {
            instrumentation,
            tool_name,
            start: Instant::now(),
            status: None,
        }
    }

    fn finish(&mut self, result: &Value) {
        self.status = Some(if is_successful_response(result) {
            CallStatus::Success
        } else {
            CallStatus::Failure
        });
    }
}

impl Drop for ToolCallGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let identity = current_client_identity();
        let status = self.status.unwrap_or(CallStatus::Error);
        let (api_calls, successful) = api_call_counts();

        if status == CallStatus::Error {
            error!(tool = %self.tool_name, client_id = %identity, "Tool call did not complete");
        }

        info!(
            tool = %self.tool_name,
            client_id = %identity,
            status = %status,
            duration_secs = duration.as_secs_f64(),
            api_calls,
            successful_api_calls = successful,
            failed_api_calls = api_calls - successful,
            "Tool call completed"
        );

        self.instrumentation
            .tool_call_completed(&self.tool_name, &identity, status, duration);
    }
}

/// Run a tool body with tool-level instrumentation
///
/// The body runs in a fresh identity scope, so a client acquired inside it
/// labels both the API attempts and the tool completion. The returned JSON
/// decides the reported status; a body that panics or is dropped early
/// reports [`CallStatus::Error`].
pub async fn instrument_tool<F>(
    instrumentation: Arc<dyn Instrumentation>,
    tool_name: impl Into<String>,
    tool: F,
) -> Value
where
    F: Future<Output = Value>,
{
    let tool_name = tool_name.into();

    TOOL_CONTEXT
        .scope(RefCell::new(ToolContext::default()), async move {
            let mut guard = ToolCallGuard::start(instrumentation, tool_name);
            let result = tool.await;
            guard.finish(&result);
            result
        })
        .await
}
