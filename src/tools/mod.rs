//! AniList tools exposed over MCP.
//!
//! Every handler follows the same cache-aside flow: derive a key from its
//! decoded parameters, return a cached result if present, otherwise call
//! upstream and store the formatted result with its [`ResourceKind`] TTL.

mod character;
mod search;
mod seasonal;
mod user;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::anilist::UpstreamClient;
use crate::auth::TokenStore;
use crate::cache::{CacheService, derive_key};
use crate::mcp::{RegistryError, ToolError, ToolRegistry};

pub use character::CharacterInfoTool;
pub use search::SearchAnimeTool;
pub use seasonal::{SeasonalAnimeTool, TrendingAnimeTool};
pub use user::{RecommendationsTool, UserListTool, ViewerListTool};

/// Cached resource families, each with its own key prefix and lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Search,
    Trending,
    Seasonal,
    Character,
    UserList,
    Recommendations,
}

impl ResourceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Trending => "trending",
            Self::Seasonal => "seasonal",
            Self::Character => "character",
            Self::UserList => "user_list",
            Self::Recommendations => "recommendations",
        }
    }

    pub fn ttl(self) -> Duration {
        let secs = match self {
            Self::Search | Self::Recommendations => 3600,
            Self::Trending => 1800,
            Self::Seasonal => 86_400,
            Self::Character => 604_800,
            Self::UserList => 300,
        };
        Duration::from_secs(secs)
    }
}

/// Services shared by all tool handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub cache: CacheService,
    pub upstream: Arc<UpstreamClient>,
    pub tokens: TokenStore,
}

/// Register the AniList tools in their advertised order.
pub fn register_default_tools(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<(), RegistryError> {
    registry.register(SearchAnimeTool::tool(ctx))?;
    registry.register(TrendingAnimeTool::tool(ctx))?;
    registry.register(SeasonalAnimeTool::tool(ctx))?;
    registry.register(CharacterInfoTool::tool(ctx))?;
    registry.register(UserListTool::tool(ctx))?;
    registry.register(RecommendationsTool::tool(ctx))?;
    registry.register(ViewerListTool::tool(ctx))?;
    Ok(())
}

/// Decode a tool's named arguments into its parameter struct.
pub(crate) fn decode_args<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::InvalidArguments(format!("invalid arguments: {e}")))
}

/// Cache-aside: cached value for `params`, or `fetch` then store.
///
/// Read, fetch and write happen strictly in that order. A failed fetch is
/// never cached.
pub(crate) async fn cache_aside<P, F, Fut>(
    cache: &CacheService,
    kind: ResourceKind,
    params: &P,
    fetch: F,
) -> Result<Value, ToolError>
where
    P: Serialize + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, ToolError>>,
{
    let key = derive_key(kind.prefix(), params);
    if let Some(hit) = cache.get::<Value>(&key).await {
        return Ok(hit);
    }

    let value = fetch().await?;
    cache.set(&key, &value, kind.ttl()).await;
    Ok(value)
}

/// `Page.media` and `Page.pageInfo` of a media search, defaulting to empty.
pub(crate) fn page_parts(data: &Value) -> (Value, Value) {
    let media = data
        .pointer("/Page/media")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let page_info = data
        .pointer("/Page/pageInfo")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    (media, page_info)
}

/// Preferred display title: English, then romaji.
pub(crate) fn display_title(media: &Value) -> &str {
    media
        .pointer("/title/english")
        .and_then(Value::as_str)
        .or_else(|| media.pointer("/title/romaji").and_then(Value::as_str))
        .unwrap_or("Unknown")
}


#[cfg(test)]
mod tests {
    use super::testing::harness;
    use super::*;

    #[test]
    fn test_ttl_policy() {
        assert_eq!(ResourceKind::Search.ttl(), Duration::from_secs(3600));
        assert_eq!(ResourceKind::Trending.ttl(), Duration::from_secs(1800));
        assert_eq!(ResourceKind::Seasonal.ttl(), Duration::from_secs(86_400));
        assert_eq!(ResourceKind::Character.ttl(), Duration::from_secs(604_800));
        assert_eq!(ResourceKind::UserList.ttl(), Duration::from_secs(300));
        assert_eq!(ResourceKind::Recommendations.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_registration_order() {
        let h = harness(vec![]);
        let mut registry = ToolRegistry::new();
        register_default_tools(&mut registry, &h.ctx).unwrap();

        let names: Vec<_> = registry.list_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            [
                "search_anime",
                "get_trending_anime",
                "get_seasonal_anime",
                "get_character_info",
                "get_user_list",
                "get_anime_recommendations",
                "get_viewer_list",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let h = harness(vec![]);
        let outcome = cache_aside(&h.ctx.cache, ResourceKind::Search, &"q", || async {
            Err(ToolError::NotFound("nothing".into()))
        })
        .await;

        assert!(outcome.is_err());
        assert!(h.store.is_empty());
    }
}
