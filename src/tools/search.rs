use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::seasonal::Season;
use super::{ResourceKind, ToolContext, cache_aside, decode_args, display_title, page_parts};
use crate::anilist::queries::SEARCH_MEDIA;
use crate::mcp::{Tool, ToolError, ToolHandler};

const MAX_QUERY_LEN: usize = 200;
const MIN_YEAR: i32 = 1940;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub minimum_score: Option<u32>,
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_sort() -> String {
    "POPULARITY_DESC".to_string()
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

impl SearchParams {
    fn validate(&self) -> Result<(), ToolError> {
        if let Some(query) = &self.query {
            if query.chars().count() > MAX_QUERY_LEN {
                return Err(ToolError::InvalidArguments("Query too long".into()));
            }
            if query.contains(['<', '>', '"', '\'']) {
                return Err(ToolError::InvalidArguments("Invalid characters in query".into()));
            }
        }
        if let Some(year) = self.year {
            let max_year = chrono::Utc::now().year() + 2;
            if !(MIN_YEAR..=max_year).contains(&year) {
                return Err(ToolError::InvalidArguments(format!(
                    "Year must be between {MIN_YEAR} and {max_year}"
                )));
            }
        }
        if self.minimum_score.is_some_and(|s| s > 100) {
            return Err(ToolError::InvalidArguments("minimum_score must be between 0 and 100".into()));
        }
        if self.page == 0 {
            return Err(ToolError::InvalidArguments("page must be at least 1".into()));
        }
        if !(1..=50).contains(&self.per_page) {
            return Err(ToolError::InvalidArguments("per_page must be between 1 and 50".into()));
        }
        Ok(())
    }

    fn variables(&self) -> Value {
        let mut vars = Map::new();
        vars.insert("page".into(), json!(self.page));
        vars.insert("perPage".into(), json!(self.per_page));
        vars.insert("sort".into(), json!(self.sort));
        vars.insert("type".into(), json!("ANIME"));

        if let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            vars.insert("search".into(), json!(query));
        }
        if let Some(genres) = self.genres.as_ref().filter(|g| !g.is_empty()) {
            vars.insert("genre_in".into(), json!(genres));
        }
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            vars.insert("tag_in".into(), json!(tags));
        }
        if let Some(season) = self.season {
            vars.insert("season".into(), json!(season));
        }
        if let Some(year) = self.year {
            vars.insert("seasonYear".into(), json!(year));
        }
        if let Some(status) = &self.status {
            vars.insert("status".into(), json!(status));
        }
        if let Some(format) = &self.format {
            vars.insert("format".into(), json!(format));
        }
        if let Some(score) = self.minimum_score.filter(|s| *s > 0) {
            vars.insert("averageScore_greater".into(), json!(score));
        }
        Value::Object(vars)
    }
}

/// Short bullet list of the first few hits.
fn summarize(media: &Value) -> String {
    let Some(items) = media.as_array().filter(|items| !items.is_empty()) else {
        return "No results found matching your criteria.".to_string();
    };

    items
        .iter()
        .take(5)
        .map(|m| {
            let score = field_or(m, "averageScore", "N/A");
            let episodes = field_or(m, "episodes", "?");
            format!("• {} (Score: {score}/100, {episodes} eps)", display_title(m))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn field_or(media: &Value, field: &str, fallback: &str) -> String {
    match media.get(field) {
        None | Some(Value::Null) => fallback.to_string(),
        Some(value) => value.to_string(),
    }
}

#[derive(Debug)]
pub struct SearchAnimeTool {
    ctx: ToolContext,
}

impl SearchAnimeTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        Tool::new(
            "search_anime",
            "Search for anime by title, genre, season, or custom filters",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query string (title keywords)" },
                    "genres": { "type": "array", "items": { "type": "string" }, "description": "Filter by genres" },
                    "tags": { "type": "array", "items": { "type": "string" }, "description": "Filter by tags" },
                    "season": { "type": "string", "enum": ["WINTER", "SPRING", "SUMMER", "FALL"] },
                    "year": { "type": "integer", "description": "Filter by year" },
                    "status": {
                        "type": "string",
                        "enum": ["FINISHED", "RELEASING", "NOT_YET_RELEASED", "CANCELLED", "HIATUS"]
                    },
                    "format": {
                        "type": "string",
                        "enum": ["TV", "TV_SHORT", "MOVIE", "SPECIAL", "OVA", "ONA", "MUSIC"]
                    },
                    "minimum_score": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "sort": {
                        "type": "string",
                        "enum": ["POPULARITY_DESC", "SCORE_DESC", "TRENDING_DESC", "START_DATE_DESC"],
                        "default": "POPULARITY_DESC"
                    },
                    "page": { "type": "integer", "default": 1, "minimum": 1 },
                    "per_page": { "type": "integer", "default": 10, "minimum": 1, "maximum": 50 }
                }
            }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }
}

#[async_trait]
impl ToolHandler for SearchAnimeTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: SearchParams = decode_args(arguments)?;
        params.validate()?;

        let upstream = &self.ctx.upstream;
        let variables = params.variables();
        let key = variables.clone();
        cache_aside(&self.ctx.cache, ResourceKind::Search, &key, move || async move {
            let data = upstream.execute(SEARCH_MEDIA, variables).await?;
            let (media, page_info) = page_parts(&data);
            Ok(json!({
                "text_summary": summarize(&media),
                "results": media,
                "page_info": page_info,
            }))
        })
        .await
    }
}
