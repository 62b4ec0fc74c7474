use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{ResourceKind, ToolContext, cache_aside, decode_args};
use crate::anilist::queries::CHARACTER;
use crate::mcp::{Tool, ToolError, ToolHandler};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterParams {
    #[serde(default)]
    pub character_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "enabled")]
    pub include_anime: bool,
}

fn enabled() -> bool {
    true
}

impl CharacterParams {
    fn variables(&self) -> Result<Value, ToolError> {
        if let Some(id) = self.character_id {
            return Ok(json!({ "id": id }));
        }
        match self.name.as_deref().map(str::trim) {
            Some(name) if name.chars().count() >= 2 => Ok(json!({ "search": name })),
            Some(_) => Err(ToolError::InvalidArguments("Name must be at least 2 characters".into())),
            None => Err(ToolError::InvalidArguments(
                "Either character_id or name must be provided".into(),
            )),
        }
    }
}

/// Pair each appearance with its edge (role, voice actors).
fn appearances(media: &Value) -> Vec<Value> {
    let empty = Vec::new();
    let nodes = media.get("nodes").and_then(Value::as_array).unwrap_or(&empty);
    let edges = media.get("edges").and_then(Value::as_array).unwrap_or(&empty);

    nodes
        .iter()
        .zip(edges)
        .map(|(node, edge)| {
            let voice_actors: Vec<Value> = edge
                .get("voiceActors")
                .and_then(Value::as_array)
                .map(|actors| {
                    actors
                        .iter()
                        .map(|va| json!({ "id": va["id"], "name": va["name"], "image": va["image"] }))
                        .collect()
                })
                .unwrap_or_default();
            json!({
                "media_id": node["id"],
                "title": node["title"],
                "type": node["type"],
                "cover_image": node["coverImage"],
                "role": edge["characterRole"],
                "voice_actors": voice_actors,
            })
        })
        .collect()
}

fn format_character(character: &Value, include_anime: bool) -> Value {
    let mut out = json!({
        "id": character["id"],
        "name": character["name"],
        "image": character["image"],
        "description": character.get("description").and_then(Value::as_str).unwrap_or_default(),
        "gender": character["gender"],
        "age": character["age"],
        "date_of_birth": character["dateOfBirth"],
        "favourites": character.get("favourites").cloned().unwrap_or(json!(0)),
        "site_url": character["siteUrl"],
    });
    if include_anime {
        out["appearances"] = Value::Array(appearances(&character["media"]));
    }
    out
}

#[derive(Debug)]
pub struct CharacterInfoTool {
    ctx: ToolContext,
}

impl CharacterInfoTool {
    pub fn tool(ctx: &ToolContext) -> Tool {
        Tool::new(
            "get_character_info",
            "Get detailed information about a character including appearances and voice actors",
            json!({
                "type": "object",
                "properties": {
                    "character_id": { "type": "integer", "description": "AniList character ID" },
                    "name": { "type": "string", "description": "Character name (alternative to ID)" },
                    "include_anime": { "type": "boolean", "default": true }
                }
            }),
            Arc::new(Self { ctx: ctx.clone() }),
        )
    }
}

#[async_trait]
impl ToolHandler for CharacterInfoTool {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let params: CharacterParams = decode_args(arguments)?;
        let variables = params.variables()?;
        let include_anime = params.include_anime;
        let upstream = &self.ctx.upstream;
        let key = json!({ "variables": variables, "include_anime": include_anime });

        cache_aside(&self.ctx.cache, ResourceKind::Character, &key, move || async move {
            let data = upstream.execute(CHARACTER, variables).await?;
            match data.get("Character") {
                Some(character) if character.is_object() => Ok(format_character(character, include_anime)),
                _ => Err(ToolError::NotFound("Character not found".into())),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anilist::testing::ok_response;
    use crate::tools::testing::{args, harness};

    fn character() -> Value {
        json!({"Character": {
            "id": 40882,
            "name": {"full": "Frieren"},
            "image": {"large": "f.png"},
            "description": "An elf mage.",
            "gender": "Female",
            "age": "1000+",
            "dateOfBirth": {"year": null, "month": null, "day": null},
            "favourites": 50000,
            "media": {
                "nodes": [{"id": 154587, "title": {"romaji": "Sousou no Frieren"}, "type": "ANIME", "coverImage": {"large": "c.png"}}],
                "edges": [{"characterRole": "MAIN", "voiceActors": [{"id": 1, "name": {"full": "Atsumi Tanezaki"}, "image": {"medium": "v.png"}}]}]
            }
        }})
    }

    #[tokio::test]
    async fn test_character_by_id_with_appearances() {
        let h = harness(vec![Ok(ok_response(character()))]);
        let tool = CharacterInfoTool::tool(&h.ctx);

        let out = tool.handler.call(args(json!({"character_id": 40882}))).await.unwrap();

        assert_eq!(out["name"]["full"], "Frieren");
        assert_eq!(out["appearances"][0]["role"], "MAIN");
        assert_eq!(out["appearances"][0]["voice_actors"][0]["name"]["full"], "Atsumi Tanezaki");
        assert_eq!(h.transport.sent_variables()[0], json!({"id": 40882}));
    }

    #[tokio::test]
    async fn test_character_by_name_without_appearances() {
        let h = harness(vec![Ok(ok_response(character()))]);
        let tool = CharacterInfoTool::tool(&h.ctx);

        let out = tool
            .handler
            .call(args(json!({"name": "Frieren", "include_anime": false})))
            .await
            .unwrap();

        assert!(out.get("appearances").is_none());
        assert_eq!(h.transport.sent_variables()[0], json!({"search": "Frieren"}));
    }

    #[tokio::test]
    async fn test_padded_name_hits_the_same_entry() {
        let h = harness(vec![Ok(ok_response(character()))]);
        let tool = CharacterInfoTool::tool(&h.ctx);

        let first = tool.handler.call(args(json!({"name": "Frieren"}))).await.unwrap();
        let second = tool.handler.call(args(json!({"name": "  Frieren "}))).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.transport.calls(), 1);

        let err = tool
            .handler
            .call(args(json!({"name": "Frieren", "include_anime": false})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Upstream(_)));
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_character_is_not_cached() {
        let h = harness(vec![
            Ok(ok_response(json!({"Character": null}))),
            Ok(ok_response(character())),
        ]);
        let tool = CharacterInfoTool::tool(&h.ctx);

        let err = tool.handler.call(args(json!({"character_id": 1}))).await.unwrap_err();
        assert_eq!(err.to_string(), "Character not found");

        tool.handler.call(args(json!({"character_id": 1}))).await.unwrap();
        assert_eq!(h.transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_requires_id_or_usable_name() {
        let h = harness(vec![]);
        let tool = CharacterInfoTool::tool(&h.ctx);

        for bad in [json!({}), json!({"name": "F"})] {
            let err = tool.handler.call(args(bad)).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
        assert_eq!(h.transport.calls(), 0);
    }
}
