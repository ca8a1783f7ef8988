//! List Facilities Example
//!
//! This example runs one instrumented tool call against the EHR API.
//!
//! To run this example:
//! ```
//! EHR_BASE_URL=https://ehr.example.com/api/v1 \
//! EHR_TOKEN_URL=https://auth.example.com/oauth/token \
//! EHR_API_KEY=... EHR_REFRESH_TOKEN=... EHR_CLIENT_ID=... EHR_CLIENT_SECRET=... \
//! COLLECT_METRICS=true cargo run --example list_facilities
//! ```

use anyhow::Context;
use serde_json::Value;

use ehr_tool_sdk::{
    instrument_tool, telemetry, telemetry::logging::init_logging, EhrClient, QueryParams,
    RequestExecutor,
};

async fn list_facilities(client: &EhrClient, active_only: Option<bool>) -> Value {
    let session = match client.acquire() {
        Ok(session) => session,
        Err(e) => return serde_json::json!({ "error": e.to_string() }),
    };

    let params = QueryParams::new().set_opt("is_active", active_only);
    match session.get("/facilities", Some(&params)).await {
        Ok(result) => result,
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(None).context("failed to initialise logging")?;

    let client = EhrClient::from_env().context("EHR client configuration is incomplete")?;
    let instrumentation = telemetry::from_env();

    let result = instrument_tool(
        instrumentation,
        "list_facilities",
        list_facilities(&client, Some(true)),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
