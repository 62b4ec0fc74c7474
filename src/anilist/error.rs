use std::time::Duration;

/// Failures of a remote GraphQL call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// HTTP 429. Carries the provider's `Retry-After` window when sent.
    #[error("AniList rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeouts, connection failures and 5xx responses.
    #[error("transient AniList failure: {0}")]
    Transient(String),

    /// Non-retryable HTTP status without a GraphQL error body.
    #[error("AniList returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The query was rejected (validation, not found, auth).
    #[error("AniList GraphQL error: {0}")]
    Graphql(String),

    #[error("malformed AniList response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether the retry policy applies to this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Transient(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            match e.status() {
                Some(status) if status.is_server_error() => Self::Transient(e.to_string()),
                Some(status) => Self::Status {
                    status: status.as_u16(),
                    message: e.to_string(),
                },
                None => Self::Transient(e.to_string()),
            }
        }
    }
}
