//! Authenticated EHR API client
//!
//! [`EhrClient`] owns one identity, one token manager and one lazily created
//! HTTP transport. Tool code normally takes a [`ClientSession`] with
//! [`EhrClient::acquire`], makes its calls through the [`RequestExecutor`]
//! verbs and lets the session drop. The transport closes when the last live
//! session drops.
//!
//! [`RequestExecutor`]: crate::core::RequestExecutor

mod executor;
mod params;
mod transport;

pub use params::{ParamValue, QueryParams};
pub use transport::UserAgent;

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, info};

use crate::auth::{ClientIdentity, TokenCache, TokenManager, TokenRefresher};
use crate::config::{ClientConfig, ServiceConfig};
use crate::core::{AuthenticatedClient, ClientBuilder};
use crate::error::{Result, ServiceError};
use crate::resilience::{RetryPolicy, Sleeper};
use crate::telemetry::{self, Instrumentation};

/// Lifecycle of a client's HTTP transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No transport created yet
    Idle,
    /// Transport open and reused by every call
    Open,
    /// Session released; calls fail until the client is acquired again
    Released,
}

enum Transport {
    Idle,
    Open(reqwest::Client),
    Released,
}

struct TransportSlot {
    state: Transport,
    sessions: usize,
}

struct ClientInner {
    config: ClientConfig,
    tokens: TokenManager,
    retry: RetryPolicy,
    instrumentation: Arc<dyn Instrumentation>,
    sleeper: Arc<dyn Sleeper>,
    user_agent: UserAgent,
    transport: Mutex<TransportSlot>,
}

/// Client for the EHR API
///
/// Cloning is cheap and clones share the transport and the token manager.
/// Sessions taken from any clone are counted together, so one tool's session
/// ending never closes the transport under another tool's live session.
#[derive(Clone)]
pub struct EhrClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for EhrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EhrClient")
            .field("identity", self.identity())
            .field("base_url", &self.inner.config.base_url)
            .field("transport", &self.transport_state())
            .finish()
    }
}

impl EhrClient {
    /// Create a client from a complete configuration
    ///
    /// Uses the process-wide token cache and `COLLECT_METRICS` instrumentation.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new().config(config).build()
    }

    /// Create a client from the `EHR_*` environment
    pub fn from_env() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Start building a client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        cache: Arc<TokenCache>,
        instrumentation: Arc<dyn Instrumentation>,
        sleeper: Arc<dyn Sleeper>,
        user_agent: UserAgent,
    ) -> Result<Self> {
        config.validate()?;
        HeaderValue::from_str(&config.api_key)
            .map_err(|e| {
                ServiceError::configuration(format!("Invalid api_key header value: {}", e))
            })?;

        let identity = ClientIdentity::new(config.client_id.clone());
        let tokens = TokenManager::new(identity, cache, TokenRefresher::new(&config)?);
        let retry = RetryPolicy::from_config(&config);

        debug!(client_id = %tokens.identity(), %retry, "EHR client created");

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                tokens,
                retry,
                instrumentation,
                sleeper,
                user_agent,
                transport: Mutex::new(TransportSlot {
                    state: Transport::Idle,
                    sessions: 0,
                }),
            }),
        })
    }

    /// Open a scoped session
    ///
    /// Labels instrumentation in the current tool call with this client's
    /// identity and opens the transport, reopening it if an earlier session
    /// released it. The transport closes when the last live session drops.
    pub fn acquire(&self) -> Result<ClientSession> {
        info!(client_id = %self.identity(), "Entering EHR API client context");
        telemetry::set_client_context(self.identity());

        {
            let mut slot = self.lock_transport();
            if matches!(slot.state, Transport::Released) {
                slot.state = Transport::Idle;
            }
            self.open_transport(&mut slot)?;
            slot.sessions += 1;
        }

        Ok(ClientSession {
            client: self.clone(),
        })
    }

    /// Close the transport
    ///
    /// Closes it even while sessions are live. Returns true if an open
    /// transport was closed. Later calls fail with
    /// `ServiceError::ClientReleased` until the client is acquired again.
    /// Cached tokens are left alone.
    pub fn release(&self) -> bool {
        let previous = std::mem::replace(&mut self.lock_transport().state, Transport::Released);
        matches!(previous, Transport::Open(_))
    }

    /// Number of sessions currently holding the transport
    pub fn active_sessions(&self) -> usize {
        self.lock_transport().sessions
    }

    /// Current transport lifecycle state
    pub fn transport_state(&self) -> TransportState {
        match self.lock_transport().state {
            Transport::Idle => TransportState::Idle,
            Transport::Open(_) => TransportState::Open,
            Transport::Released => TransportState::Released,
        }
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The token cache this client shares
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        self.inner.tokens.cache()
    }

    /// The retry policy applied to every call
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub(crate) fn instrumentation(&self) -> &Arc<dyn Instrumentation> {
        &self.inner.instrumentation
    }

    pub(crate) fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.inner.sleeper
    }

    /// Absolute URL for an API path
    pub fn url_for(&self, endpoint: &str) -> String {
        let base = self.inner.config.base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }

    /// The open transport, created on first use
    pub(crate) fn transport(&self) -> Result<reqwest::Client> {
        self.open_transport(&mut self.lock_transport())
    }

    fn open_transport(&self, slot: &mut TransportSlot) -> Result<reqwest::Client> {
        match &slot.state {
            Transport::Open(client) => Ok(client.clone()),
            Transport::Released => Err(ServiceError::client_released(format!(
                "EHR client for {} was released; acquire it again before making calls",
                self.identity()
            ))),
            Transport::Idle => {
                let client =
                    transport::build_http_client(&self.inner.config, &self.inner.user_agent)?;
                debug!(client_id = %self.identity(), "Opened EHR API transport");
                slot.state = Transport::Open(client.clone());
                Ok(client)
            }
        }
    }

    /// Drop one session's hold; closes the transport when none remain
    fn end_session(&self) -> bool {
        let mut slot = self.lock_transport();
        slot.sessions = slot.sessions.saturating_sub(1);
        if slot.sessions > 0 {
            debug!(
                client_id = %self.identity(),
                sessions = slot.sessions,
                "EHR API transport still held by other sessions"
            );
            return false;
        }
        matches!(
            std::mem::replace(&mut slot.state, Transport::Released),
            Transport::Open(_)
        )
    }

    fn lock_transport(&self) -> MutexGuard<'_, TransportSlot> {
        self.inner.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuthenticatedClient for EhrClient {
    fn identity(&self) -> &ClientIdentity {
        self.inner.tokens.identity()
    }

    async fn bearer_token(&self) -> Result<String> {
        self.inner.tokens.valid_token().await
    }

    fn apply_auth(&self, token: &str, headers: &mut HeaderMap) -> Result<()> {
        let value = HeaderValue::from_str(&format!("{} {}", self.auth_type(), token))
            .map_err(|e| ServiceError::internal(format!("Invalid auth header: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    async fn invalidate_auth(&self, rejected_token: &str) {
        self.inner.tokens.invalidate(rejected_token).await;
    }
}

impl EhrClient {
    /// Identity this client caches tokens under
    pub fn identity(&self) -> &ClientIdentity {
        AuthenticatedClient::identity(self)
    }
}

/// A scoped hold on an [`EhrClient`]
///
/// Dereferences to the client. Dropping the session gives up its hold on the
/// transport exactly once, whether the scope ends normally, through `?` or by
/// unwinding. The last session to drop closes the transport.
#[must_use = "the session ends as soon as it is dropped"]
pub struct ClientSession {
    client: EhrClient,
}

impl ClientSession {
    /// End the session now instead of at the end of the scope
    pub fn close(self) {}

    /// The client behind this session
    pub fn client(&self) -> &EhrClient {
        &self.client
    }
}

impl Deref for ClientSession {
    type Target = EhrClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.client.end_session() {
            debug!(client_id = %self.client.identity(), "Closed EHR API transport");
        }
        info!(client_id = %self.client.identity(), "Exiting EHR API client context");
    }
}
