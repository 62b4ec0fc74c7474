//! GraphQL client with retry and rate-limit self-throttling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::UpstreamError;
use super::queries::Operation;
use super::rate_limit::{RateBudget, RateLimitInfo};
use super::retry::RetryPolicy;

/// Wire body of a GraphQL POST.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    pub query: &'static str,
    pub variables: Value,
}

/// Raw upstream reply, before GraphQL interpretation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub rate_limit: RateLimitInfo,
    pub body: Value,
}

/// Sends one GraphQL request. Implementations perform no retries.
#[async_trait]
pub trait GraphqlTransport: Send + Sync + std::fmt::Debug {
    async fn send(
        &self,
        request: &GraphqlRequest,
        bearer: Option<&str>,
    ) -> Result<TransportResponse, UpstreamError>;
}

/// `reqwest`-backed transport for the AniList endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("anilist-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl GraphqlTransport for HttpTransport {
    async fn send(
        &self,
        request: &GraphqlRequest,
        bearer: Option<&str>,
    ) -> Result<TransportResponse, UpstreamError> {
        let mut rb = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(request);
        if let Some(token) = bearer {
            rb = rb.bearer_auth(token);
        }

        let resp = rb.send().await?;
        let status = resp.status().as_u16();
        let rate_limit = rate_limit_info(resp.headers());
        let text = resp.text().await?;
        // Error pages from the edge are not JSON; status alone decides those.
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(TransportResponse {
            status,
            rate_limit,
            body,
        })
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Read AniList's rate-limit headers.
pub fn rate_limit_info(headers: &HeaderMap) -> RateLimitInfo {
    let remaining = header_u64(headers, "x-ratelimit-remaining").and_then(|v| u32::try_from(v).ok());
    let limit = header_u64(headers, "x-ratelimit-limit").and_then(|v| u32::try_from(v).ok());

    let reset_after = header_u64(headers, "retry-after")
        .map(Duration::from_secs)
        .or_else(|| {
            header_u64(headers, "x-ratelimit-reset").map(|reset_at| {
                let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
                Duration::from_secs(reset_at.saturating_sub(now))
            })
        });

    RateLimitInfo {
        remaining,
        limit,
        reset_after,
    }
}

/// Turn a raw reply into the GraphQL `data` member or a typed failure.
fn interpret(response: TransportResponse) -> Result<Value, UpstreamError> {
    let TransportResponse {
        status,
        rate_limit,
        body,
    } = response;

    if status == 429 {
        return Err(UpstreamError::RateLimited {
            retry_after: rate_limit.reset_after,
        });
    }
    if status >= 500 {
        return Err(UpstreamError::Transient(format!("HTTP {status}")));
    }

    if let Some(errors) = body
        .get("errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty())
    {
        if errors
            .iter()
            .any(|e| e.get("status").and_then(Value::as_u64) == Some(429))
        {
            return Err(UpstreamError::RateLimited {
                retry_after: rate_limit.reset_after,
            });
        }

        let messages: Vec<&str> = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(Value::as_str))
            .collect();
        let message = if messages.is_empty() {
            "unknown error".to_string()
        } else {
            messages.join("; ")
        };
        return Err(UpstreamError::Graphql(message));
    }

    if !(200..300).contains(&status) {
        return Err(UpstreamError::Status {
            status,
            message: body.to_string(),
        });
    }

    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(UpstreamError::Decode("response carries no data".to_string())),
        },
        _ => Err(UpstreamError::Decode("response is not a JSON object".to_string())),
    }
}

/// Executes named operations against the upstream GraphQL API.
///
/// Each call waits out the reset window if the tracked budget is low, then
/// retries transient failures per [`RetryPolicy`]. A 429 additionally sleeps
/// the full reset window before the backoff.
#[derive(Debug)]
pub struct UpstreamClient {
    transport: Arc<dyn GraphqlTransport>,
    retry: RetryPolicy,
    budget: RateBudget,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn GraphqlTransport>, retry: RetryPolicy, budget: RateBudget) -> Self {
        Self {
            transport,
            retry,
            budget,
        }
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run an anonymous operation.
    pub async fn execute(&self, operation: Operation, variables: Value) -> Result<Value, UpstreamError> {
        self.run(operation, variables, None).await
    }

    /// Run an operation on behalf of a user.
    pub async fn execute_as(
        &self,
        operation: Operation,
        variables: Value,
        access_token: &str,
    ) -> Result<Value, UpstreamError> {
        self.run(operation, variables, Some(access_token)).await
    }

    async fn run(
        &self,
        operation: Operation,
        variables: Value,
        bearer: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let request = GraphqlRequest {
            query: operation.document,
            variables,
        };

        let mut attempt = 1;
        loop {
            self.budget.throttle().await;
            self.budget.consume();

            let outcome = self
                .transport
                .send(&request, bearer)
                .await
                .and_then(|response| {
                    self.budget.observe(&response.rate_limit);
                    interpret(response)
                });

            let error = match outcome {
                Ok(data) => {
                    debug!(name: "upstream.ok", operation = operation.name, attempt, "Upstream call succeeded");
                    return Ok(data);
                }
                Err(e) => e,
            };

            if !error.is_transient() || !self.retry.allows_retry_after(attempt) {
                warn!(
                    name: "upstream.failed",
                    operation = operation.name,
                    attempt,
                    error = %error,
                    "Upstream call failed"
                );
                return Err(error);
            }

            if let UpstreamError::RateLimited { retry_after } = &error {
                let window = retry_after.unwrap_or_else(|| self.budget.reset_window());
                warn!(
                    name: "upstream.rate_limited",
                    operation = operation.name,
                    wait_secs = window.as_secs(),
                    "Rate limited by upstream, waiting for reset window"
                );
                tokio::time::sleep(window).await;
                self.budget.restore();
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                name: "upstream.retry",
                operation = operation.name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Transient upstream failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
