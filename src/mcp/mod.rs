//! Model Context Protocol (MCP) server core.
//!
//! Requests arrive as JSON-RPC envelopes:
//!
//! ```json
//! { "jsonrpc": "2.0", "method": "tools/call",
//!   "params": { "name": "search_anime", "arguments": { "query": "Frieren" } },
//!   "id": 1 }
//! ```
//!
//! and are answered by [`ProtocolDispatcher::handle`], which supports
//! `initialize`, `tools/list`, `tools/call` and `resources/list`.
//!
//! # Error codes
//!
//! | Code | Meaning |
//! |---|---|
//! | -32700 | body is not JSON (HTTP transport) |
//! | -32600 | JSON, but not a request envelope (HTTP transport) |
//! | -32601 | method not found |
//! | -32602 | tool not found / missing tool name |
//! | -32603 | tool execution error, including non-object `arguments` |

pub mod dispatcher;
pub mod registry;
pub mod types;

pub use dispatcher::{PROTOCOL_VERSION, ProtocolDispatcher, SERVER_NAME};
pub use registry::{RegistryError, Tool, ToolError, ToolHandler, ToolRegistry};
pub use types::{RpcError, RpcRequest, RpcResponse, ToolSchema};
