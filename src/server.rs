use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::anilist::{GraphqlTransport, HttpTransport};
use crate::auth::{AuthError, HttpOAuthProvider, OAuthProvider};
use crate::cache::{KeyValueStore, MemoryStore};
use crate::config::{AppConfig, CacheBackend, CacheConfig};
use crate::mcp::SERVER_NAME;
use crate::mcp::types::{INVALID_REQUEST, PARSE_ERROR, RpcRequest, RpcResponse};

/// Session header of the MCP HTTP transport.
pub const SESSION_HEADER: &str = "mcp-session-id";

const LOGIN_STATE_PREFIX: &str = "oauth:state";
const LOGIN_STATE_TTL: Duration = Duration::from_secs(600);

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config)).await?;

    for tool in state.dispatcher.registry().list_schemas() {
        info!(name: "mcp.tool.registered", tool = %tool.name, "MCP tool registered");
    }

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Production wiring: configured cache store, reqwest upstream and token endpoint.
pub async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let store = open_store(&config.cache).await?;
    let transport: Arc<dyn GraphqlTransport> = Arc::new(HttpTransport::new(
        config.anilist.api_url.clone(),
        config.anilist.request_timeout(),
    )?);
    let provider: Arc<dyn OAuthProvider> = Arc::new(HttpOAuthProvider::new(
        config.oauth.settings(),
        config.anilist.request_timeout(),
    )?);

    info!(
        name: "anilist.config.loaded",
        api_url = %config.anilist.api_url,
        cache_backend = ?config.cache.backend,
        oauth_configured = !config.oauth.client_id.is_empty(),
        "AniList configuration loaded"
    );

    Ok(AppState::new(config, store, transport, provider)?)
}

async fn open_store(cache: &CacheConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let store = crate::cache::RedisStore::connect(&cache.redis_url).await?;
            info!(name: "cache.redis.connected", "Connected to Redis");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => {
            anyhow::bail!("cache.backend = \"redis\" requires building with the `redis` feature")
        }
    }
}

/// All routes, with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/mcp", post(mcp_endpoint))
        .route("/auth/login", get(auth_login))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/logout", get(auth_logout))
        .route("/health", get(health))
        .route("/health/cache", get(health_cache))
        .route("/health/ready", get(health_ready))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(name: "server.cors.invalid_origin", origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(name: "server.signal.failed", error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!(name: "server.shutdown", "Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP transport
// ─────────────────────────────────────────────────────────────────────────────

/// POST /mcp - one JSON-RPC envelope in, one out. Always HTTP 200.
async fn mcp_endpoint(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let response = match decode_request(&body) {
        Ok(request) => state.dispatcher.handle(&session_id, request).await,
        Err(response) => {
            warn!(
                name: "mcp.request.malformed",
                session_id = %session_id,
                code = response.error.as_ref().map_or(0, |e| e.code),
                "Malformed request body"
            );
            response
        }
    };

    let mut out = Json(response).into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        out.headers_mut().insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    out
}

/// Body that is not JSON is a parse error with a null id. JSON of the wrong
/// shape keeps whatever `id` it carried.
fn decode_request(body: &[u8]) -> Result<RpcRequest, RpcResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RpcResponse::failure(None, PARSE_ERROR, format!("Parse error: {e}")))?;

    let id = value.get("id").cloned();
    serde_json::from_value(value)
        .map_err(|e| RpcResponse::failure(id, INVALID_REQUEST, format!("Invalid Request: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuth
// ─────────────────────────────────────────────────────────────────────────────

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": detail.into() })))
}

fn auth_failure(context: &str, e: &AuthError) -> ApiError {
    let status = match e {
        AuthError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Rejected { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, format!("{context}: {e}"))
}

fn login_state_key(state: &str) -> String {
    format!("{LOGIN_STATE_PREFIX}:{state}")
}

/// GET /auth/login - redirect to the AniList consent page.
async fn auth_login(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let login_state = Uuid::new_v4().simple().to_string();
    let url = state
        .tokens
        .authorize_url(&login_state)
        .map_err(|e| auth_failure("OAuth unavailable", &e))?;

    state
        .store
        .set(&login_state_key(&login_state), "1", LOGIN_STATE_TTL)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("Could not start login: {e}")))?;

    Ok(Redirect::temporary(url.as_str()))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/callback - exchange the code and link the account.
async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(error) = query.error {
        return Err(api_error(StatusCode::BAD_REQUEST, format!("OAuth error: {error}")));
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "No authorization code provided"));
    };

    // Each login state is single-use.
    let issued = match query.state.as_deref() {
        Some(s) => state.store.delete(&login_state_key(s)).await.unwrap_or(false),
        None => false,
    };
    if !issued {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid or expired OAuth state"));
    }

    let token = state
        .tokens
        .exchange_code(&code)
        .await
        .map_err(|e| auth_failure("Token exchange failed", &e))?;

    Ok(Json(json!({
        "status": "success",
        "message": "Authentication successful",
        "user_id": token.user_id,
        "token_type": token.token_type,
    })))
}

#[derive(Debug, Deserialize)]
struct LogoutQuery {
    user_id: String,
}

/// GET /auth/logout?user_id= - revoke the stored token.
async fn auth_logout(
    State(state): State<AppState>,
    Query(query): Query<LogoutQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .tokens
        .revoke(&query.user_id)
        .await
        .map_err(|e| auth_failure("Logout failed", &e))?;

    Ok(Json(json!({ "status": "success", "message": "Logged out successfully" })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

async fn root() -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health/cache - write then read a probe key.
async fn health_cache(State(state): State<AppState>) -> Json<Value> {
    let probe = async {
        state
            .store
            .set("health_check", "ok", Duration::from_secs(10))
            .await?;
        state.store.get("health_check").await
    };

    Json(match probe.await {
        Ok(Some(value)) if value == "ok" => json!({ "status": "healthy", "cache": "connected" }),
        Ok(_) => json!({ "status": "unhealthy", "cache": "unexpected response" }),
        Err(e) => json!({ "status": "unhealthy", "cache": e.to_string() }),
    })
}

async fn health_ready() -> Json<Value> {
    Json(json!({ "ready": true }))
}
