use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{ResourceKind, ToolContext, cache_aside, decode_args, page_parts};
use crate::anilist::queries::SEARCH_MEDIA;
use crate::mcp::{Tool, ToolError, ToolHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Dec-Feb winter, Mar-May spring, Jun-Aug summer, otherwise fall.
    pub fn of_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Self::Winter,
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            _ => Self::Fall,
        }
    }

    pub fn current(today: NaiveDate) -> (Self, i32) {
        (Self::of_month(today.month()), today.year())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    #[default]
    Anime,
    Manga,
}

impl MediaType {
    fn label(self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::Manga => "manga",
        }
    }
}

fn check_paging(page: u32, per_page: u32) -> Result<(), ToolError> {
    if page == 0 {
        return Err(ToolError::InvalidArguments("page must be at least 1".into()));
    }
    if !(1..=50).contains(&per_page) {
        return Err(ToolError::InvalidArguments("per_page must be between 1 and 50".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingParams {
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "trending_page_size")]
    pub per_page: u32,
}

fn first_page() -> u32 {
    1
}

fn trending_page_size() -> u32 {
    10
}

#[derive(Debug)]
pub struct TrendingAnimeTool {
    ctx: ToolContext,
}

impl TrendingAnimeTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        Tool::new(
            "get_trending_anime",
            "Get currently trending anime based on AniList activity",
            json!({
                "type": "object",
                "properties": {
                    "media_type": { "type": "string", "enum": ["ANIME", "MANGA"], "default": "ANIME" },
                    "page": { "type": "integer", "default": 1 },
                    "per_page": { "type": "integer", "default": 10, "maximum": 50 }
                }
            }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }
}

#[async_trait]
impl ToolHandler for TrendingAnimeTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: TrendingParams = decode_args(arguments)?;
        check_paging(params.page, params.per_page)?;

        let upstream = &self.ctx.upstream;
        let variables = json!({
            "page": params.page,
            "perPage": params.per_page,
            "sort": "TRENDING_DESC",
            "type": params.media_type,
        });
        let summary = format!(
            "Showing {} trending {} titles",
            params.per_page,
            params.media_type.label()
        );

        cache_aside(&self.ctx.cache, ResourceKind::Trending, &params, move || async move {
            let data = upstream.execute(SEARCH_MEDIA, variables).await?;
            let (media, page_info) = page_parts(&data);
            Ok(json!({
                "results": media,
                "page_info": page_info,
                "text_summary": summary,
            }))
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonalParams {
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "seasonal_page_size")]
    pub per_page: u32,
}

fn seasonal_page_size() -> u32 {
    25
}

/// Seasonal query with the defaults filled in; this is what gets cached.
#[derive(Debug, Serialize)]
struct ResolvedSeason {
    season: Season,
    year: i32,
    page: u32,
    per_page: u32,
}

impl SeasonalParams {
    fn resolve(&self, today: NaiveDate) -> ResolvedSeason {
        let (current_season, current_year) = Season::current(today);
        ResolvedSeason {
            season: self.season.unwrap_or(current_season),
            year: self.year.unwrap_or(current_year),
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug)]
pub struct SeasonalAnimeTool {
    ctx: ToolContext,
}

impl SeasonalAnimeTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        Tool::new(
            "get_seasonal_anime",
            "Get anime for a specific season and year",
            json!({
                "type": "object",
                "properties": {
                    "season": { "type": "string", "enum": ["WINTER", "SPRING", "SUMMER", "FALL"] },
                    "year": { "type": "integer" },
                    "page": { "type": "integer", "default": 1 },
                    "per_page": { "type": "integer", "default": 25, "maximum": 50 }
                }
            }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }
}

#[async_trait]
impl ToolHandler for SeasonalAnimeTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: SeasonalParams = decode_args(arguments)?;
        check_paging(params.page, params.per_page)?;
        let resolved = params.resolve(Utc::now().date_naive());

        let upstream = &self.ctx.upstream;
        let variables = json!({
            "page": resolved.page,
            "perPage": resolved.per_page,
            "sort": "POPULARITY_DESC",
            "type": "ANIME",
            "season": resolved.season,
            "seasonYear": resolved.year,
        });
        let (season, year) = (resolved.season, resolved.year);

        cache_aside(&self.ctx.cache, ResourceKind::Seasonal, &resolved, move || async move {
            let data = upstream.execute(SEARCH_MEDIA, variables).await?;
            let (media, page_info) = page_parts(&data);
            Ok(json!({
                "season": season,
                "year": year,
                "results": media,
                "page_info": page_info,
            }))
        })
        .await
    }
}
