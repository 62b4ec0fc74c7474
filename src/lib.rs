//! AniList MCP tool server
//!
//! Exposes AniList search, trending and seasonal listings, character lookup,
//! user lists and recommendations to MCP clients over JSON-RPC, backed by a
//! TTL cache and a rate-limited GraphQL upstream.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP transport framing JSON-RPC envelopes per session
//! - **Dispatcher**: routes `initialize`, `tools/list`, `tools/call`, `resources/list`
//! - **Tools**: cache-aside handlers with per-resource TTL policy
//! - **Upstream**: GraphQL client with retry, backoff and self-throttling
//! - **Auth**: OAuth token lifecycle with single-flight refresh
//!
//! # Modules
//!
//! - [`anilist`]: upstream GraphQL client
//! - [`auth`]: OAuth provider and token store
//! - [`cache`]: key-value stores and the cache-aside service
//! - [`mcp`]: protocol types, tool registry, dispatcher
//! - [`session`]: per-connection session table
//! - [`tools`]: the AniList tools

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod anilist;
pub mod auth;
pub mod cache;
pub mod config;
pub mod mcp;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod tools;

use std::sync::Arc;

use crate::anilist::{GraphqlTransport, UpstreamClient};
use crate::auth::{OAuthProvider, TokenStore};
use crate::cache::{CacheService, KeyValueStore};
use crate::config::AppConfig;
use crate::mcp::{ProtocolDispatcher, RegistryError, ToolRegistry};
use crate::session::SessionStore;
use crate::tools::{ToolContext, register_default_tools};

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Protocol entry point; owns the session table.
    pub dispatcher: ProtocolDispatcher,
    /// OAuth token lifecycle.
    pub tokens: TokenStore,
    /// Shared key-value store (cache and token keyspaces).
    pub store: Arc<dyn KeyValueStore>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the services around the given store, upstream transport and
    /// token endpoint, and register the AniList tools.
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn GraphqlTransport>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Result<Self, RegistryError> {
        let upstream = Arc::new(UpstreamClient::new(
            transport,
            config.anilist.retry_policy(),
            config.anilist.rate_budget(),
        ));
        let tokens = TokenStore::new(Arc::clone(&store), Arc::clone(&upstream), provider);
        let ctx = ToolContext {
            cache: CacheService::new(Arc::clone(&store)),
            upstream,
            tokens: tokens.clone(),
        };

        let mut registry = ToolRegistry::new();
        register_default_tools(&mut registry, &ctx)?;

        Ok(Self {
            dispatcher: ProtocolDispatcher::new(Arc::new(registry), SessionStore::new()),
            tokens,
            store,
            config,
        })
    }
}
