//! # EHR Tool SDK
//!
//! Authenticated access to an EHR practice-management API for tool-calling
//! agents.
//!
//! This crate provides:
//!
//! - OAuth2 bearer tokens cached per client identity and refreshed at most
//!   once at a time per identity
//! - A request executor that recovers from 401s and retries transport
//!   failures with exponential backoff
//! - Scoped client sessions that close their transport on drop
//! - Tool and API call instrumentation through the `metrics` facade
//!
//! ## Architecture
//!
//! - `EhrClient`: the client façade, built with `ClientBuilder`
//! - `RequestExecutor`: `get`/`post`/`put`/`delete` and the retry loop
//! - `AuthenticatedClient`: token lookup and invalidation
//! - `TokenCache`: process-wide token store, injectable for tests
//! - `Instrumentation`: tool and API call events
//! - `ServiceError`: error taxonomy for unusable clients
//!
//! ```no_run
//! use ehr_tool_sdk::{EhrClient, QueryParams, RequestExecutor};
//!
//! # async fn run() -> ehr_tool_sdk::Result<()> {
//! let client = EhrClient::from_env()?;
//! let session = client.acquire()?;
//! let params = QueryParams::new().set("is_active", true);
//! let facilities = session.get("/facilities", Some(&params)).await?;
//! println!("{}", facilities);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod resilience;
pub mod telemetry;

mod util;

pub use auth::{CachedToken, ClientIdentity, TokenCache};
pub use client::{ClientSession, EhrClient, QueryParams, TransportState, UserAgent};
pub use config::{ClientConfig, ConfigProvider, ServiceConfig};
pub use crate::core::{AuthenticatedClient, ClientBuilder, HttpMethod, RequestExecutor};
pub use error::{Result, ServiceError};
pub use resilience::{RetryPolicy, Sleeper};
pub use telemetry::{
    instrument_tool, CallStatus, Instrumentation, MetricsInstrumentation, NoopInstrumentation,
};

/// Create a new default client builder
pub fn client() -> ClientBuilder {
    ClientBuilder::new()
}

#[cfg(test)]
mod tests;
