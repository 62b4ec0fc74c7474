use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::seasonal::MediaType;
use super::{ResourceKind, ToolContext, cache_aside, decode_args};
use crate::anilist::queries::{RECOMMENDATIONS, SEARCH_MEDIA, USER_LIST};
use crate::mcp::{Tool, ToolError, ToolHandler};

const LIST_STATUSES: [&str; 6] = ["CURRENT", "PLANNING", "COMPLETED", "DROPPED", "PAUSED", "REPEATING"];
const MAX_RECOMMENDATIONS: u32 = 20;

fn default_list_sort() -> String {
    "UPDATED_TIME".to_string()
}

fn list_properties() -> Value {
    json!({
        "list_type": { "type": "string", "enum": ["ANIME", "MANGA"], "default": "ANIME" },
        "status": { "type": "string", "enum": LIST_STATUSES },
        "sort": {
            "type": "string",
            "enum": ["SCORE", "PROGRESS", "UPDATED_TIME", "STARTED_ON", "FINISHED_ON"],
            "default": "UPDATED_TIME"
        }
    })
}

/// Keep the lists matching `status` (all when `None`) and count their entries.
fn format_collection(data: &Value, status: Option<&str>) -> Value {
    let collection = &data["MediaListCollection"];
    let lists: Vec<Value> = collection
        .get("lists")
        .and_then(Value::as_array)
        .map(|lists| {
            lists
                .iter()
                .filter(|l| status.is_none_or(|s| l.get("status").and_then(Value::as_str) == Some(s)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let total_entries: usize = lists
        .iter()
        .map(|l| l.get("entries").and_then(Value::as_array).map_or(0, Vec::len))
        .sum();

    json!({
        "user": collection.get("user").cloned().unwrap_or_else(|| json!({})),
        "lists": lists,
        "total_entries": total_entries,
    })
}

fn check_status(status: Option<&str>) -> Result<(), ToolError> {
    match status {
        Some(s) if !LIST_STATUSES.contains(&s) => {
            Err(ToolError::InvalidArguments(format!("unknown list status: {s}")))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListParams {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub list_type: MediaType,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_list_sort")]
    pub sort: String,
}

#[derive(Debug)]
pub struct UserListTool {
    ctx: ToolContext,
}

impl UserListTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        let mut properties = list_properties();
        properties["user_id"] = json!({ "type": "integer", "description": "AniList user ID" });
        properties["user_name"] = json!({ "type": "string", "description": "AniList username" });
        Tool::new(
            "get_user_list",
            "Get a user's anime/manga list from AniList",
            json!({ "type": "object", "properties": properties }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }
}

#[async_trait]
impl ToolHandler for UserListTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: UserListParams = decode_args(arguments)?;
        let user_name = params.user_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        if params.user_id.is_none() && user_name.is_none() {
            return Err(ToolError::InvalidArguments(
                "Either user_id or user_name must be provided".into(),
            ));
        }
        check_status(params.status.as_deref())?;

        let upstream = &self.ctx.upstream;
        let status = params.status.clone();
        let variables = json!({
            "userId": params.user_id,
            "userName": user_name,
            "type": params.list_type,
            "sort": [params.sort],
        });
        let key = json!({ "variables": variables, "status": status });

        cache_aside(&self.ctx.cache, ResourceKind::UserList, &key, move || async move {
            let data = upstream.execute(USER_LIST, variables).await?;
            Ok(format_collection(&data, status.as_deref()))
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerListParams {
    /// Linked account id, as returned by the OAuth callback.
    pub user_id: String,
    #[serde(default)]
    pub list_type: MediaType,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_list_sort")]
    pub sort: String,
}

/// The signed-in user's own list, including private entries.
#[derive(Debug)]
pub struct ViewerListTool {
    ctx: ToolContext,
}

impl ViewerListTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        let mut properties = list_properties();
        properties["user_id"] = json!({
            "type": "string",
            "description": "AniList user ID of an account linked through /auth/login"
        });
        Tool::new(
            "get_viewer_list",
            "Get the authenticated user's own anime/manga list, including private entries",
            json!({ "type": "object", "properties": properties, "required": ["user_id"] }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }
}

#[async_trait]
impl ToolHandler for ViewerListTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: ViewerListParams = decode_args(arguments)?;
        check_status(params.status.as_deref())?;
        let anilist_id: u64 = params
            .user_id
            .parse()
            .map_err(|e| ToolError::InvalidArguments(format!("user_id must be numeric: {e}")))?;

        let token = self.ctx.tokens.access_token(&params.user_id).await?;

        let upstream = &self.ctx.upstream;
        let status = params.status.clone();
        let variables = json!({
            "userId": anilist_id,
            "type": params.list_type,
            "sort": [params.sort],
        });
        let key = json!({ "viewer": { "variables": variables, "status": status } });

        cache_aside(&self.ctx.cache, ResourceKind::UserList, &key, move || async move {
            let data = upstream.execute_as(USER_LIST, variables, &token).await?;
            Ok(format_collection(&data, status.as_deref()))
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationParams {
    #[serde(default)]
    pub reference_anime_id: Option<u64>,
    #[serde(default)]
    pub reference_title: Option<String>,
    #[serde(default = "default_recommendation_type")]
    pub recommendation_type: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub exclude_ids: Vec<u64>,
}

fn default_recommendation_type() -> String {
    "similar".to_string()
}

fn default_count() -> u32 {
    5
}

#[derive(Debug, Serialize)]
struct RecommendationKey<'a> {
    reference_anime_id: u64,
    recommendation_type: &'a str,
    count: u32,
    exclude_ids: &'a [u64],
}

#[derive(Debug)]
pub struct RecommendationsTool {
    ctx: ToolContext,
}

impl RecommendationsTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        Tool::new(
            "get_anime_recommendations",
            "Get anime recommendations based on a reference anime",
            json!({
                "type": "object",
                "properties": {
                    "reference_anime_id": { "type": "integer", "description": "AniList ID of reference anime" },
                    "reference_title": { "type": "string", "description": "Title of reference anime" },
                    "recommendation_type": {
                        "type": "string",
                        "enum": ["similar", "taste_profile", "trending_genre"],
                        "default": "similar"
                    },
                    "count": { "type": "integer", "default": 5, "maximum": MAX_RECOMMENDATIONS },
                    "exclude_ids": { "type": "array", "items": { "type": "integer" } }
                }
            }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }

    /// Resolve the reference id, searching by title if no id was given.
    async fn reference_id(&self, params: &RecommendationParams) -> Result<u64, ToolError> {
        if let Some(id) = params.reference_anime_id {
            return Ok(id);
        }
        let Some(title) = params.reference_title.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Err(ToolError::InvalidArguments(
                "Either reference_anime_id or reference_title must be provided".into(),
            ));
        };

        let data = self
            .ctx
            .upstream
            .execute(
                SEARCH_MEDIA,
                json!({ "search": title, "page": 1, "perPage": 1, "type": "ANIME" }),
            )
            .await?;
        data.pointer("/Page/media/0/id")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::NotFound("Could not find reference anime".into()))
    }
}

#[async_trait]
impl ToolHandler for RecommendationsTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: RecommendationParams = decode_args(arguments)?;
        if !(1..=MAX_RECOMMENDATIONS).contains(&params.count) {
            return Err(ToolError::InvalidArguments(format!(
                "count must be between 1 and {MAX_RECOMMENDATIONS}"
            )));
        }

        let reference_id = self.reference_id(&params).await?;
        let key = RecommendationKey {
            reference_anime_id: reference_id,
            recommendation_type: &params.recommendation_type,
            count: params.count,
            exclude_ids: &params.exclude_ids,
        };

        let upstream = &self.ctx.upstream;
        let excluded = &params.exclude_ids;
        let count = usize::try_from(params.count).unwrap_or(usize::MAX);
        let recommendation_type = params.recommendation_type.as_str();

        cache_aside(&self.ctx.cache, ResourceKind::Recommendations, &key, move || async move {
            let data = upstream
                .execute(RECOMMENDATIONS, json!({ "id": reference_id, "perPage": 25 }))
                .await?;

            let nodes = data
                .pointer("/Media/recommendations/nodes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let recommendations: Vec<Value> = nodes
                .iter()
                .filter(|rec| {
                    rec.pointer("/mediaRecommendation/id")
                        .and_then(Value::as_u64)
                        .is_none_or(|id| !excluded.contains(&id))
                })
                .take(count)
                .map(|rec| {
                    json!({
                        "anime": rec.get("mediaRecommendation").cloned().unwrap_or_else(|| json!({})),
                        "rating": rec["rating"],
                        "user_rating": rec["userRating"],
                    })
                })
                .collect();

            Ok(json!({
                "reference_anime_id": reference_id,
                "recommendation_type": recommendation_type,
                "recommendations": recommendations,
            }))
        })
        .await
    }
}
