//! AniList OAuth2 token endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::error::AuthError;

/// Which grant to present to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

/// Successful token endpoint reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// The authorization server.
#[async_trait]
pub trait OAuthProvider: Send + Sync + std::fmt::Debug {
    /// Browser redirect target for the authorization-code flow.
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError>;

    /// One call to the token endpoint. Non-2xx replies are [`AuthError::Rejected`].
    async fn request_token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, AuthError>;
}

/// OAuth client registration.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
}

/// `reqwest`-backed [`OAuthProvider`].
#[derive(Clone)]
pub struct HttpOAuthProvider {
    http: reqwest::Client,
    settings: OAuthSettings,
}

impl std::fmt::Debug for HttpOAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keep the client secret out of logs.
        f.debug_struct("HttpOAuthProvider")
            .field("client_id", &self.settings.client_id)
            .field("token_url", &self.settings.token_url)
            .finish_non_exhaustive()
    }
}

impl HttpOAuthProvider {
    pub fn new(settings: OAuthSettings, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self { http, settings })
    }

    fn ensure_configured(&self) -> Result<(), AuthError> {
        if self.settings.client_id.trim().is_empty() {
            return Err(AuthError::NotConfigured("oauth.client_id"));
        }
        if self.settings.redirect_uri.trim().is_empty() {
            return Err(AuthError::NotConfigured("oauth.redirect_uri"));
        }
        Ok(())
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        self.ensure_configured()?;
        build_authorize_url(&self.settings, state)
    }

    async fn request_token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, AuthError> {
        self.ensure_configured()?;
        let s = &self.settings;
        let body = match grant {
            TokenGrant::AuthorizationCode(code) => json!({
                "grant_type": "authorization_code",
                "client_id": s.client_id,
                "client_secret": s.client_secret,
                "redirect_uri": s.redirect_uri,
                "code": code,
            }),
            TokenGrant::RefreshToken(refresh_token) => json!({
                "grant_type": "refresh_token",
                "client_id": s.client_id,
                "client_secret": s.client_secret,
                "refresh_token": refresh_token,
            }),
        };

        let resp = self
            .http
            .post(&s.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

/// `authorize_url?client_id=..&redirect_uri=..&response_type=code&state=..`
pub fn build_authorize_url(settings: &OAuthSettings, state: &str) -> Result<Url, AuthError> {
    let mut url = Url::parse(&settings.authorize_url)
        .map_err(|e| AuthError::Malformed(format!("invalid authorize url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &settings.client_id)
        .append_pair("redirect_uri", &settings.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("state", state);
    Ok(url)
}
