use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::types::ToolSchema;
use crate::anilist::UpstreamError;
use crate::auth::AuthError;

/// Failure of a tool handler. Always reported to the caller as an execution error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("tool name must not be empty")]
    EmptyName,
}

/// A tool implementation: named arguments in, structured result out.
#[async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON-Schema-like parameter description, advertised as-is.
    pub parameters: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// In-memory tool catalog, listed in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.tools.len())
            .field("tools", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool, replacing any previous tool of the same name in place.
    pub fn register(&mut self, tool: Tool) -> Result<(), RegistryError> {
        if tool.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(&slot) = self.index.get(&tool.name) {
            tracing::debug!(name: "mcp.tool.replaced", tool = %tool.name, "Replacing registered tool");
            self.tools[slot] = tool;
        } else {
            self.index.insert(tool.name.clone(), self.tools.len());
            self.tools.push(tool);
        }
        Ok(())
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(Tool::schema).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Echo(&'static str);

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
            Ok(json!({ "from": self.0, "args": arguments }))
        }
    }

    fn tool(name: &str, tag: &'static str) -> Tool {
        Tool::new(name, format!("{name} tool"), json!({"type": "object"}), Arc::new(Echo(tag)))
    }

    #[test]
    fn test_lists_in_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(tool(name, "v1")).unwrap();
        }
        let names: Vec<_> = registry.list_schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_reregistration_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("a", "v1")).unwrap();
        registry.register(tool("b", "v1")).unwrap();
        registry.register(tool("a", "v2")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_schemas()[0].name, "a");

        let out = registry.get_tool("a").unwrap().handler.call(Map::new()).await.unwrap();
        assert_eq!(out["from"], "v2");
    }

    #[test]
    fn test_lookup_and_empty_name() {
        let mut registry = ToolRegistry::new();
        assert!(registry.get_tool("missing").is_none());
        assert_eq!(registry.register(tool("  ", "v1")), Err(RegistryError::EmptyName));
        assert!(registry.is_empty());
    }
}
