//! Method routing and envelope construction.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::registry::ToolRegistry;
use super::types::{
    INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, ResourceDescriptor, RpcRequest, RpcResponse,
};
use crate::session::SessionStore;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "anilist-mcp";

/// Routes requests to the registry and wraps outcomes in envelopes.
///
/// Owns the session table. Never fails: every request gets exactly one
/// response carrying the request's id.
#[derive(Debug, Clone)]
pub struct ProtocolDispatcher {
    registry: Arc<ToolRegistry>,
    sessions: SessionStore,
}

impl ProtocolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, sessions: SessionStore) -> Self {
        Self { registry, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn handle(&self, session_id: &str, request: RpcRequest) -> RpcResponse {
        debug!(name: "mcp.request", session_id = %session_id, method = %request.method, "Handling request");

        match request.method.as_str() {
            "initialize" => self.initialize(session_id, request),
            "tools/list" => {
                let tools = self.registry.list_schemas();
                RpcResponse::success(request.id, json!({ "tools": tools }))
            }
            "tools/call" => self.call_tool(request).await,
            "resources/list" => {
                RpcResponse::success(request.id, json!({ "resources": resources() }))
            }
            other => {
                let message = format!("Method not found: {other}");
                RpcResponse::failure(request.id, METHOD_NOT_FOUND, message)
            }
        }
    }

    fn initialize(&self, session_id: &str, request: RpcRequest) -> RpcResponse {
        let client_info = match request.param("clientInfo") {
            Some(Value::Object(info)) => info.clone(),
            _ => Map::new(),
        };
        let session = self.sessions.initialize(session_id, client_info);
        info!(
            name: "mcp.session.initialized",
            session_id = %session.id,
            client = session.client_name().unwrap_or("unknown"),
            "Session initialized"
        );

        RpcResponse::success(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": true },
                    "resources": { "subscribe": true },
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
    }

    async fn call_tool(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest { id, params, .. } = request;
        let params = params.unwrap_or_default();

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::failure(id, INVALID_PARAMS, "Invalid params: missing tool name");
        };

        let Some(tool) = self.registry.get_tool(name) else {
            let message = format!("Tool not found: {name}");
            return RpcResponse::failure(id, INVALID_PARAMS, message);
        };

        // Absent and null both mean "no arguments"; anything else must be an object.
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args.clone(),
            Some(_) => {
                warn!(name: "mcp.tool.bad_arguments", tool = %name, "Tool arguments are not an object");
                return RpcResponse::failure(
                    id,
                    INTERNAL_ERROR,
                    "Tool execution error: arguments must be an object",
                );
            }
        };

        info!(name: "mcp.tool.call", tool = %name, "Invoking tool");
        match tool.handler.call(arguments).await {
            Ok(result) => match serde_json::to_string_pretty(&result) {
                Ok(text) => {
                    RpcResponse::success(id, json!({ "content": [{ "type": "text", "text": text }] }))
                }
                Err(e) => {
                    RpcResponse::failure(id, INTERNAL_ERROR, format!("Tool execution error: {e}"))
                }
            },
            Err(e) => {
                warn!(name: "mcp.tool.failed", tool = %name, error = %e, "Tool call failed");
                RpcResponse::failure(id, INTERNAL_ERROR, format!("Tool execution error: {e}"))
            }
        }
    }
}

fn resources() -> Vec<ResourceDescriptor> {
    [
        ("anilist://trending", "Trending Anime"),
        ("anilist://seasonal/current", "Current Season Anime"),
    ]
    .into_iter()
    .map(|(uri, name)| ResourceDescriptor {
        uri: uri.to_string(),
        name: name.to_string(),
        mime_type: "application/json".to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::{Tool, ToolError, ToolHandler};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ToolHandler for Counting {
        async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolError::InvalidArguments("query is required".into()));
            }
            Ok(json!({ "echo": arguments }))
        }
    }

    fn dispatcher_with(handler: Arc<Counting>) -> ProtocolDispatcher {
        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::new("echo", "Echo", json!({"type": "object"}), handler))
            .unwrap();
        ProtocolDispatcher::new(Arc::new(registry), SessionStore::new())
    }

    fn request(method: &str, params: Option<Value>, id: Option<Value>) -> RpcRequest {
        RpcRequest::new(method, params, id)
    }

    #[tokio::test]
    async fn test_initialize_records_session() {
        let d = dispatcher_with(Arc::default());
        let resp = d
            .handle(
                "s-1",
                request("initialize", Some(json!({"clientInfo": {"name": "cli"}})), Some(json!(1))),
            )
            .await;

        assert!(d.sessions().contains("s-1"));
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(resp.id, json!(1));
    }

    #[tokio::test]
    async fn test_other_methods_do_not_create_sessions() {
        let d = dispatcher_with(Arc::default());
        let resp = d.handle("s-2", request("tools/list", None, Some(json!(3)))).await;
        assert!(!resp.is_error());
        assert!(d.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_tool_result_is_text_block() {
        let handler = Arc::new(Counting::default());
        let d = dispatcher_with(Arc::clone(&handler));
        let resp = d
            .handle(
                "s",
                request(
                    "tools/call",
                    Some(json!({"name": "echo", "arguments": {"q": "x"}})),
                    Some(json!("abc")),
                ),
            )
            .await;

        let content = &resp.result.unwrap()["content"][0];
        assert_eq!(content["type"], "text");
        let parsed: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(parsed, json!({"echo": {"q": "x"}}));
        assert_eq!(resp.id, json!("abc"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_execution_error() {
        let handler = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let d = dispatcher_with(handler);
        let resp = d
            .handle("s", request("tools/call", Some(json!({"name": "echo"})), Some(json!(9))))
            .await;

        let err = resp.error.unwrap();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert_eq!(err.message, "Tool execution error: query is required");
        assert_eq!(resp.id, json!(9));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_name() {
        let handler = Arc::new(Counting::default());
        let d = dispatcher_with(Arc::clone(&handler));

        let missing = d
            .handle("s", request("tools/call", Some(json!({"name": "x", "arguments": {}})), Some(json!(2))))
            .await;
        let err = missing.error.unwrap();
        assert_eq!((err.code, err.message.as_str()), (INVALID_PARAMS, "Tool not found: x"));

        let nameless = d.handle("s", request("tools/call", None, None)).await;
        assert_eq!(nameless.error.unwrap().code, INVALID_PARAMS);
        assert_eq!(nameless.id, Value::Null);

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_rejected_before_the_handler() {
        let handler = Arc::new(Counting::default());
        let d = dispatcher_with(Arc::clone(&handler));

        for bad in [json!([1, 2]), json!("q"), json!(3)] {
            let resp = d
                .handle(
                    "s",
                    request("tools/call", Some(json!({"name": "echo", "arguments": bad})), Some(json!(4))),
                )
                .await;
            let err = resp.error.unwrap();
            assert_eq!(err.code, INTERNAL_ERROR);
            assert_eq!(err.message, "Tool execution error: arguments must be an object");
            assert_eq!(resp.id, json!(4));
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

        let resp = d
            .handle("s", request("tools/call", Some(json!({"name": "echo", "arguments": null})), Some(json!(5))))
            .await;
        assert!(!resp.is_error());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_method_and_resources() {
        let d = dispatcher_with(Arc::default());

        let resp = d.handle("s", request("prompts/list", None, Some(json!(5)))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method not found: prompts/list");

        let resp = d.handle("s", request("resources/list", None, Some(json!(6)))).await;
        let resources = resp.result.unwrap()["resources"].clone();
        assert_eq!(resources[0]["uri"], "anilist://trending");
        assert_eq!(resources[0]["mimeType"], "application/json");
    }
}
