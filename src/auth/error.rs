use crate::anilist::UpstreamError;
use crate::cache::StoreError;

/// OAuth token lifecycle failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint answered with a non-2xx status.
    #[error("token endpoint rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("malformed token response: {0}")]
    Malformed(String),

    /// The identity lookup with a fresh token failed.
    #[error("could not resolve token owner: {0}")]
    Identity(String),

    #[error("no linked AniList account for user {0}")]
    NotLinked(String),

    #[error("access token refresh failed for user {0}")]
    RefreshFailed(String),

    #[error("token storage failed: {0}")]
    Store(String),

    #[error("OAuth client is not configured: {0}")]
    NotConfigured(&'static str),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<UpstreamError> for AuthError {
    fn from(e: UpstreamError) -> Self {
        Self::Identity(e.to_string())
    }
}
