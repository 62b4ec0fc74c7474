//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anilist_mcp::AppState;
use anilist_mcp::anilist::{
    GraphqlRequest, GraphqlTransport, RateLimitInfo, TransportResponse, UpstreamError,
};
use anilist_mcp::auth::{AuthError, OAuthProvider, OAuthSettings, TokenGrant, TokenResponse};
use anilist_mcp::auth::oauth::build_authorize_url;
use anilist_mcp::cache::{KeyValueStore, MemoryStore};
use anilist_mcp::config::{
    AnilistConfig, AppConfig, CacheBackend, CacheConfig, LoggingConfig, OAuthConfig, RetryConfig,
    ServerConfig,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

pub fn ok(data: Value) -> Result<TransportResponse, UpstreamError> {
    Ok(TransportResponse {
        status: 200,
        rate_limit: RateLimitInfo::default(),
        body: json!({ "data": data }),
    })
}

/// Replays scripted upstream replies in order.
#[derive(Debug, Default)]
pub struct FakeUpstream {
    script: Mutex<VecDeque<Result<TransportResponse, UpstreamError>>>,
    bearers: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new(script: Vec<Result<TransportResponse, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphqlTransport for FakeUpstream {
    async fn send(
        &self,
        _request: &GraphqlRequest,
        bearer: Option<&str>,
    ) -> Result<TransportResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bearers.lock().unwrap().push(bearer.map(str::to_string));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Transient("script exhausted".into())))
    }
}

/// Token endpoint that issues numbered tokens.
#[derive(Debug)]
pub struct FakeTokenEndpoint {
    settings: OAuthSettings,
    issued: AtomicUsize,
}

impl FakeTokenEndpoint {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            settings,
            issued: AtomicUsize::new(0),
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthProvider for FakeTokenEndpoint {
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        build_authorize_url(&self.settings, state)
    }

    async fn request_token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, AuthError> {
        if grant == TokenGrant::AuthorizationCode("bad-code") {
            return Err(AuthError::Rejected {
                status: 400,
                message: "invalid_grant".into(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse {
            access_token: format!("access-{n}"),
            token_type: "Bearer".into(),
            expires_in: 3600,
            refresh_token: Some(format!("refresh-{n}")),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec!["*".into()],
        },
        anilist: AnilistConfig {
            api_url: "http://anilist.invalid".into(),
            request_timeout_secs: 5,
            rate_limit_low_water: 5,
            rate_limit_requests: 90,
            rate_limit_window_secs: 60,
            retry: RetryConfig {
                max_attempts: 1,
                initial_backoff_ms: 10,
                max_backoff_ms: 10,
            },
        },
        oauth: OAuthConfig {
            client_id: "1234".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:8000/auth/callback".into(),
            authorize_url: "https://anilist.co/api/v2/oauth/authorize".into(),
            token_url: "https://anilist.co/api/v2/oauth/token".into(),
        },
        cache: CacheConfig {
            backend: CacheBackend::Memory,
            redis_url: String::new(),
        },
        logging: LoggingConfig { json: false },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub upstream: Arc<FakeUpstream>,
    pub tokens: Arc<FakeTokenEndpoint>,
    pub store: Arc<MemoryStore>,
}

pub fn test_app(script: Vec<Result<TransportResponse, UpstreamError>>) -> TestApp {
    let config = Arc::new(test_config());
    let upstream = Arc::new(FakeUpstream::new(script));
    let tokens = Arc::new(FakeTokenEndpoint::new(config.oauth.settings()));
    let store = Arc::new(MemoryStore::new());

    let state = AppState::new(
        config,
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Arc::clone(&upstream) as Arc<dyn GraphqlTransport>,
        Arc::clone(&tokens) as Arc<dyn OAuthProvider>,
    )
    .unwrap();

    TestApp {
        state,
        upstream,
        tokens,
        store,
    }
}
