//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, the tool domain values, and server configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC protocol version stamped on every outgoing envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request message.
///
/// The client leaves `id` empty; the transport assigns the correlation ID.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request without a correlation ID.
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

// ─── MCP Methods ─────────────────────────────────────────────────────────────

/// Method name for tool discovery.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Method name for tool invocation.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Schema text used when a server omits one.
pub const EMPTY_SCHEMA: &str = "{}";

// ─── Tool Domain Values ──────────────────────────────────────────────────────

/// Decoded description of a callable tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContract {
    pub name: String,
    pub description: String,
    /// Raw JSON text of the tool's input schema.
    pub input_schema: String,
    /// Raw JSON text of the tool's output schema (`"{}"` when not declared).
    pub output_schema: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A tool invocation request: tool name plus raw JSON arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Build a call from an already-structured argument value.
    pub fn from_value(name: impl Into<String>, arguments: &serde_json::Value) -> Self {
        Self::new(name, arguments.to_string())
    }
}

/// The outcome of a tool invocation: tool name plus raw JSON result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub result: String,
}

impl ToolResult {
    pub fn new(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: result.into(),
        }
    }
}

// ─── Server Configuration ────────────────────────────────────────────────────

/// How to launch one MCP server process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the server process.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Per-server override of the client's call timeout.
    #[serde(default, alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

impl ServerConfig {
    /// Config for `command` with `args` and no other settings.
    pub fn new<I, S>(command: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Top-level MCP servers configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServersConfig {
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_omits_missing_id() {
        let req = JsonRpcRequest::new(METHOD_TOOLS_LIST, serde_json::json!({}));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(json.contains("\"params\":{}"));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_json_rpc_request_with_id() {
        let mut req = JsonRpcRequest::new(
            METHOD_TOOLS_CALL,
            serde_json::json!({"name": "echo", "arguments": {"text": "hi"}}),
        );
        req.id = Some("7".into());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"id\":\"7\""));
        assert!(json.contains("tools/call"));
    }

    #[test]
    fn test_tool_call_from_value() {
        let call = ToolCall::from_value("echo", &serde_json::json!({"text": "hi"}));
        assert_eq!(call.name, "echo");
        assert_eq!(call.arguments, r#"{"text":"hi"}"#);
    }

    #[test]
    fn test_server_config_defaults() {
        let json = r#"{"command": "npx", "args": ["server-everything"]}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.command, "npx");
        assert_eq!(config.args, vec!["server-everything"]);
        assert!(config.env.is_empty());
        assert!(config.cwd.is_none());
        assert!(config.timeout_ms.is_none());
    }

    #[test]
    fn test_server_config_new() {
        let config = ServerConfig::new("python3", ["-m", "server"]);
        assert_eq!(config.command, "python3");
        assert_eq!(config.args, vec!["-m", "server"]);
    }
}
