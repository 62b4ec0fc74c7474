//! Per-user OAuth token storage with single-flight refresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use super::error::AuthError;
use super::oauth::{OAuthProvider, TokenGrant, TokenResponse};
use crate::anilist::UpstreamClient;
use crate::anilist::queries::VIEWER;
use crate::cache::{KeyValueStore, MAX_TTL};

/// Keyspace owned by the token store.
pub const TOKEN_KEY_PREFIX: &str = "oauth:tokens";

/// Tokens this close to expiry are refreshed before use.
const REFRESH_SKEW: Duration = Duration::from_secs(60);

/// A stored token record, keyed by the owning AniList user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

impl OAuthToken {
    fn issue(user_id: &str, response: TokenResponse) -> Self {
        let expires_at = i64::try_from(response.expires_in.min(MAX_TTL.as_secs()))
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            user_id: user_id.to_string(),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            expires_at,
        }
    }

    /// Time left before the access token expires.
    pub fn remaining_lifetime(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn expires_within(&self, window: Duration) -> bool {
        self.remaining_lifetime() <= window
    }
}

pub fn token_key(user_id: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}:{user_id}")
}

type RefreshFlight = Shared<BoxFuture<'static, Option<String>>>;

/// Persists, refreshes and revokes OAuth tokens.
///
/// Concurrent [`TokenStore::refresh`] calls for the same user share one
/// token-endpoint request; calls for different users run independently.
#[derive(Debug, Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

struct TokenStoreInner {
    store: Arc<dyn KeyValueStore>,
    upstream: Arc<UpstreamClient>,
    provider: Arc<dyn OAuthProvider>,
    in_flight: Mutex<HashMap<String, RefreshFlight>>,
}

impl std::fmt::Debug for TokenStoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("TokenStore")
            .field("provider", &self.provider)
            .field("refreshes_in_flight", &in_flight)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        upstream: Arc<UpstreamClient>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(TokenStoreInner {
                store,
                upstream,
                provider,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        self.inner.provider.authorize_url(state)
    }

    /// Exchange an authorization code, resolve the token owner and persist
    /// the record under that owner's id.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken, AuthError> {
        let response = self
            .inner
            .provider
            .request_token(TokenGrant::AuthorizationCode(code))
            .await?;

        let user_id = self.inner.resolve_owner(&response.access_token).await?;
        let token = OAuthToken::issue(&user_id, response);
        self.inner.persist(&token).await?;

        info!(name: "auth.token.issued", user_id = %user_id, expires_in = token.expires_in, "OAuth token stored");
        Ok(token)
    }

    /// The stored record, if any.
    pub async fn load(&self, user_id: &str) -> Result<Option<OAuthToken>, AuthError> {
        self.inner.load(user_id).await
    }

    /// Refresh the user's access token.
    ///
    /// Returns `None` without calling upstream when no refresh token is stored,
    /// and `None` on any refresh failure, leaving the old record in place.
    pub async fn refresh(&self, user_id: &str) -> Option<String> {
        let flight = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(existing) = in_flight.get(user_id) {
                debug!(name: "auth.refresh.coalesced", user_id = %user_id, "Joining in-flight token refresh");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let owner = user_id.to_string();
                let flight = async move {
                    let outcome = inner.refresh_now(&owner).await;
                    inner
                        .in_flight
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&owner);
                    outcome
                }
                .boxed()
                .shared();
                in_flight.insert(user_id.to_string(), flight.clone());
                flight
            }
        };

        flight.await
    }

    /// A usable access token, refreshed first if it is about to expire.
    pub async fn access_token(&self, user_id: &str) -> Result<String, AuthError> {
        let token = self
            .inner
            .load(user_id)
            .await?
            .ok_or_else(|| AuthError::NotLinked(user_id.to_string()))?;

        if !token.expires_within(REFRESH_SKEW) {
            return Ok(token.access_token);
        }

        self.refresh(user_id)
            .await
            .ok_or_else(|| AuthError::RefreshFailed(user_id.to_string()))
    }

    /// Delete the user's record. Revoking an absent record is not an error.
    pub async fn revoke(&self, user_id: &str) -> Result<(), AuthError> {
        let removed = self.inner.store.delete(&token_key(user_id)).await?;
        info!(name: "auth.token.revoked", user_id = %user_id, removed, "OAuth token revoked");
        Ok(())
    }
}

impl TokenStoreInner {
    async fn load(&self, user_id: &str) -> Result<Option<OAuthToken>, AuthError> {
        let Some(raw) = self.store.get(&token_key(user_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::Store(format!("malformed token record: {e}")))
    }

    /// Write the whole record, replacing any previous one, with TTL equal to
    /// the token's lifetime.
    async fn persist(&self, token: &OAuthToken) -> Result<(), AuthError> {
        let raw = serde_json::to_string(token).map_err(|e| AuthError::Store(e.to_string()))?;
        let ttl = Duration::from_secs(token.expires_in.max(1)).min(MAX_TTL);
        self.store.set(&token_key(&token.user_id), &raw, ttl).await?;
        Ok(())
    }

    async fn resolve_owner(&self, access_token: &str) -> Result<String, AuthError> {
        let data = self
            .upstream
            .execute_as(VIEWER, json!({}), access_token)
            .await?;

        match data.pointer("/Viewer/id") {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(AuthError::Identity("viewer id missing from response".to_string())),
        }
    }

    async fn refresh_now(&self, user_id: &str) -> Option<String> {
        let current = match self.load(user_id).await {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                warn!(name: "auth.refresh.failed", user_id = %user_id, error = %e, "Could not load token record");
                return None;
            }
        };

        let refresh_token = current.refresh_token.as_deref()?;

        let response = match self
            .provider
            .request_token(TokenGrant::RefreshToken(refresh_token))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(name: "auth.refresh.failed", user_id = %user_id, error = %e, "Token endpoint refused refresh");
                return None;
            }
        };

        let token = OAuthToken::issue(user_id, response);
        if let Err(e) = self.persist(&token).await {
            warn!(name: "auth.refresh.failed", user_id = %user_id, error = %e, "Could not store refreshed token");
            return None;
        }

        info!(name: "auth.token.refreshed", user_id = %user_id, "OAuth token refreshed");
        Some(token.access_token)
    }
}
