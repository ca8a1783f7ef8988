//! Request execution with token recovery and retry
//!
//! One logical call is a bounded loop over physical attempts. A 401 drops
//! the rejected token and retries at once; transport failures retry after
//! `2^retry_count` seconds; both draw on the same `max_retries` budget.
//! Terminal failures come back as `{"error": ...}` values.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, error, warn, Instrument};

use super::{EhrClient, QueryParams};
use crate::core::{AuthenticatedClient, HttpMethod, RequestExecutor};
use crate::error::mapping::{classify_http_error, error_payload, is_retryable_server_status};
use crate::error::{Result, ServiceError};
use crate::telemetry::{sanitize_endpoint, ApiCallGuard};
use crate::util::{generate_request_id, sanitize_for_logging, truncate_string};

const MAX_LOGGED_BODY_CHARS: usize = 500;

/// What to do after a failed attempt
enum NextStep {
    /// Retry immediately with a fresh token
    Reauthenticate,
    /// Retry after the backoff delay
    Backoff,
    /// Stop and report the failure
    Fail,
}

#[async_trait]
impl RequestExecutor for EhrClient {
    /// Execute one logical call
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authentication` if the token endpoint refuses
    /// the refresh grant and `ServiceError::ClientReleased` if the session
    /// was released. Every other failure is returned as `Ok({"error": ...})`.
    async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Option<&QueryParams>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let request_id = generate_request_id();
        let span = tracing::debug_span!(
            "ehr_request",
            request_id = %request_id,
            method = %method,
            endpoint,
            client_id = %self.identity()
        );

        self.execute_with_retries(method, endpoint, params, body)
            .instrument(span)
            .await
    }
}

impl EhrClient {
    async fn execute_with_retries(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Option<&QueryParams>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let retry = self.retry_policy().clone();
        let metrics_endpoint = sanitize_endpoint(endpoint);
        let url = self.url_for(endpoint);
        let mut retry_count: u32 = 0;

        loop {
            let transport = self.transport()?;
            let token = self.bearer_token().await?;

            let mut headers = HeaderMap::new();
            if let Err(e) = self.apply_auth(&token, &mut headers) {
                error!(error = %e, "Failed to build request headers");
                return Ok(error_payload(&e));
            }

            let mut guard = ApiCallGuard::start(
                self.instrumentation().clone(),
                self.identity().clone(),
                metrics_endpoint.clone(),
                method,
            );

            debug!(retry_count, "Making {} request to {}", method, endpoint);

            let failure = match send_once(&transport, method, &url, params, body, headers).await {
                Ok(value) => {
                    guard.succeed();
                    return Ok(value);
                }
                Err(e) => e,
            };
            drop(guard);

            match next_step(&failure, retry.retry_server_errors) {
                NextStep::Reauthenticate if retry.can_retry(retry_count) => {
                    warn!(retry_count, "Received 401, forcing token refresh");
                    self.invalidate_auth(&token).await;
                    retry_count += 1;
                }
                NextStep::Backoff if retry.can_retry(retry_count) => {
                    let delay = retry.backoff_delay(retry_count);
                    warn!(
                        retry_count,
                        delay_secs = delay.as_secs_f64(),
                        error = %failure,
                        "Request failed, retrying"
                    );
                    self.sleeper().sleep(delay).await;
                    retry_count += 1;
                }
                step => {
                    log_terminal_failure(&failure, &step, retry.max_retries);
                    return Ok(error_payload(&failure));
                }
            }
        }
    }
}

/// Send one attempt and decode a 2xx body
async fn send_once(
    transport: &reqwest::Client,
    method: HttpMethod,
    url: &str,
    params: Option<&QueryParams>,
    body: Option<&Value>,
    headers: HeaderMap,
) -> Result<Value> {
    let mut request = transport.request(method.into(), url).headers(headers);

    if let Some(params) = params.filter(|p| !p.is_empty()) {
        request = request.query(params.pairs());
    }
    if let Some(body) = body.filter(|_| method.carries_body()) {
        request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::http(status.as_u16(), body));
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(json!({}));
    }

    serde_json::from_str(&text)
        .map_err(|e| ServiceError::parsing(format!("Invalid JSON in response body: {}", e)))
}

fn next_step(err: &ServiceError, retry_server_errors: bool) -> NextStep {
    match err {
        ServiceError::Http { status: 401, .. } => NextStep::Reauthenticate,
        ServiceError::Http { status, .. }
            if retry_server_errors
                && StatusCode::from_u16(*status).map_or(false, is_retryable_server_status) =>
        {
            NextStep::Backoff
        }
        e if e.is_retryable() => NextStep::Backoff,
        _ => NextStep::Fail,
    }
}

fn log_terminal_failure(err: &ServiceError, step: &NextStep, max_retries: u32) {
    match err {
        ServiceError::Http { status, body } => {
            let category = StatusCode::from_u16(*status).map_or("unknown", classify_http_error);
            let body = truncate_string(&sanitize_for_logging(body), MAX_LOGGED_BODY_CHARS);
            if matches!(step, NextStep::Fail) {
                error!(status, category, body = %body, "HTTP error");
            } else {
                error!(
                    status,
                    category,
                    body = %body,
                    max_retries,
                    "HTTP error after exhausting retries"
                );
            }
        }
        e if e.is_retryable() => {
            error!(error = %e, max_retries, "Request failed after {} retries", max_retries);
        }
        e => {
            error!(error = %e, "Unexpected error");
        }
    }
}
