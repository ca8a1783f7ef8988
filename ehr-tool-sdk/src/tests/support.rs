//! Shared test doubles and mock server helpers

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use crate::auth::{ClientIdentity, TokenCache};
use crate::config::MemoryConfigProvider;
use crate::core::{ClientBuilder, HttpMethod};
use crate::resilience::Sleeper;
use crate::telemetry::{CallStatus, Instrumentation};

pub const TOKEN_PATH: &str = "/oauth/token";
pub const CLIENT_ID: &str = "client-a";

/// One instrumentation callback, with durations dropped
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ToolStarted {
        tool: String,
        identity: String,
    },
    ToolCompleted {
        tool: String,
        identity: String,
        status: CallStatus,
    },
    ApiStarted {
        identity: String,
        endpoint: String,
        method: HttpMethod,
    },
    ApiCompleted {
        identity: String,
        endpoint: String,
        method: HttpMethod,
        success: bool,
    },
}

#[derive(Debug, Default)]
pub struct RecordingInstrumentation {
    events: Mutex<Vec<Event>>,
}

impl RecordingInstrumentation {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn api_outcomes(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::ApiCompleted { success, .. } => Some(success),
                _ => None,
            })
            .collect()
    }

    pub fn api_started_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::ApiStarted { .. }))
            .count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Instrumentation for RecordingInstrumentation {
    fn tool_call_started(&self, tool_name: &str, identity: &ClientIdentity) {
        self.push(Event::ToolStarted {
            tool: tool_name.to_string(),
            identity: identity.to_string(),
        });
    }

    fn tool_call_completed(
        &self,
        tool_name: &str,
        identity: &ClientIdentity,
        status: CallStatus,
        _duration: Duration,
    ) {
        self.push(Event::ToolCompleted {
            tool: tool_name.to_string(),
            identity: identity.to_string(),
            status,
        });
    }

    fn api_call_started(&self, identity: &ClientIdentity, endpoint: &str, method: HttpMethod) {
        self.push(Event::ApiStarted {
            identity: identity.to_string(),
            endpoint: endpoint.to_string(),
            method,
        });
    }

    fn api_call_completed(
        &self,
        identity: &ClientIdentity,
        endpoint: &str,
        method: HttpMethod,
        _duration: Duration,
        success: bool,
    ) {
        self.push(Event::ApiCompleted {
            identity: identity.to_string(),
            endpoint: endpoint.to_string(),
            method,
            success,
        });
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Everything a test needs to observe one client
pub struct Harness {
    pub server: MockServer,
    pub cache: Arc<TokenCache>,
    pub instrumentation: Arc<RecordingInstrumentation>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            cache: Arc::new(TokenCache::new()),
            instrumentation: Arc::new(RecordingInstrumentation::default()),
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }

    pub fn api_url(&self) -> String {
        format!("{}/api", self.server.uri())
    }

    /// Builder wired to the mock server, the isolated cache and the doubles
    pub fn builder(&self) -> ClientBuilder {
        ClientBuilder::new()
            .config_provider(Arc::new(MemoryConfigProvider::new()))
            .base_url(self.api_url())
            .token_url(format!("{}{}", self.server.uri(), TOKEN_PATH))
            .api_key("test-api-key")
            .refresh_token("test-refresh-token")
            .client_id(CLIENT_ID)
            .client_secret("test-client-secret")
            .redirect_uri("https://app.example.com/callback")
            .token_cache(self.cache.clone())
            .instrumentation(self.instrumentation.clone())
            .sleeper(self.sleeper.clone())
    }

    /// Fail the test if the token endpoint is called at all
    pub async fn forbid_refresh(&self) {
        token_mock("unexpected").expect(0).mount(&self.server).await;
    }

    /// Serve `token` from the token endpoint exactly `times` times
    pub async fn mount_token(&self, token: &str, times: u64) {
        token_mock(token)
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }
}

/// Matcher for the refresh-token grant sent by the default test client
pub fn token_request() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(query_param("grant_type", "refresh_token"))
        .and(query_param("client_id", CLIENT_ID))
}

/// Token endpoint mock answering the refresh-token grant with `token`
pub fn token_mock(token: &str) -> Mock {
    token_request().respond_with(token_response(token))
}

pub fn token_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "expires_in": 3600,
        "scope": "patients.read facilities.read"
    }))
}
