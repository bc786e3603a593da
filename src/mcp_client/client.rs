//! High-level interface for tool discovery and execution.
//!
//! Encodes `tools/list` and `tools/call` as JSON-RPC requests, sends them
//! through a [`Transport`], and decodes results (or protocol errors) into
//! domain values. Decoding is tolerant: missing fields fall back to defaults.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::errors::McpError;
use super::transport::{StdioTransport, Transport};
use super::types::{
    error_codes, JsonRpcRequest, ServerConfig, ToolCall, ToolContract, ToolResult, EMPTY_SCHEMA,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for a single request (ms).
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Message used when a server's error object carries no usable `message`.
const UNKNOWN_ERROR: &str = "Unknown error";

// ─── McpClient ───────────────────────────────────────────────────────────────

/// MCP client bound to one server through one transport.
pub struct McpClient<T: Transport = StdioTransport> {
    transport: T,
    /// Per-request timeout in milliseconds.
    call_timeout_ms: u64,
}

impl McpClient<StdioTransport> {
    /// Spawn the configured server and wrap it in a client.
    ///
    /// A `timeout_ms` in the config overrides the default call timeout.
    pub fn connect(name: &str, config: &ServerConfig) -> Result<Self, McpError> {
        let transport = StdioTransport::spawn(name, config)?;
        let mut client = Self::new(transport);
        if let Some(timeout_ms) = config.timeout_ms {
            client.set_call_timeout(timeout_ms);
        }
        Ok(client)
    }
}

impl<T: Transport> McpClient<T> {
    /// Create a client that owns `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    /// Set the per-request timeout in milliseconds.
    pub fn set_call_timeout(&mut self, timeout_ms: u64) {
        self.call_timeout_ms = timeout_ms;
    }

    pub fn call_timeout_ms(&self) -> u64 {
        self.call_timeout_ms
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Dispose the owned transport. Safe to call more than once.
    pub async fn dispose(&self) {
        self.transport.dispose().await;
    }

    // ─── Tool Discovery ──────────────────────────────────────────────────

    /// List the server's tools in the order the server returned them.
    pub async fn list_tools(&self) -> Result<Vec<ToolContract>, McpError> {
        self.list_tools_with_cancel(&CancellationToken::new()).await
    }

    /// [`list_tools`](Self::list_tools) with caller-controlled cancellation.
    pub async fn list_tools_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolContract>, McpError> {
        let result = self
            .request(METHOD_TOOLS_LIST, serde_json::json!({}), cancel)
            .await?;

        let tools = decode_tool_list(result.as_ref());
        tracing::debug!(count = tools.len(), "listed MCP tools");
        Ok(tools)
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Invoke a tool and return its raw JSON result.
    pub async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, McpError> {
        self.call_tool_with_cancel(call, &CancellationToken::new())
            .await
    }

    /// [`call_tool`](Self::call_tool) with caller-controlled cancellation.
    ///
    /// Steps:
    /// 1. Parse the arguments as JSON (nothing is sent if they are invalid)
    /// 2. Send a `tools/call` request with `{name, arguments}`
    /// 3. Surface a server `error` with the tool name attached
    /// 4. Return `result` as JSON text (`"{}"` when absent)
    pub async fn call_tool_with_cancel(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, McpError> {
        let start = Instant::now();

        let arguments: Value =
            serde_json::from_str(&call.arguments).map_err(|e| McpError::InvalidArguments {
                tool: call.name.clone(),
                reason: format!("arguments are not valid JSON: {e}"),
            })?;

        let params = serde_json::json!({
            "name": call.name,
            "arguments": arguments,
        });

        let result = match self.request(METHOD_TOOLS_CALL, params, cancel).await {
            Err(McpError::ProtocolError { code, message }) => {
                return Err(McpError::ProtocolError {
                    code,
                    message: format!("tool '{}' failed: {message}", call.name),
                });
            }
            other => other?,
        };

        tracing::debug!(
            tool = %call.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool call completed"
        );

        let result = result
            .map(|value| value.to_string())
            .unwrap_or_else(|| EMPTY_SCHEMA.to_string());
        Ok(ToolResult::new(call.name.clone(), result))
    }

    // ─── Request Plumbing ────────────────────────────────────────────────

    /// Send one request bounded by the call timeout; return its `result`, if any.
    async fn request(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, McpError> {
        let request = serde_json::to_string(&JsonRpcRequest::new(method, params)).map_err(|e| {
            McpError::InvalidRequest {
                reason: format!("failed to serialize {method} request: {e}"),
            }
        })?;

        let response = tokio::time::timeout(
            Duration::from_millis(self.call_timeout_ms),
            self.transport.send(&request, cancel),
        )
        .await
        .map_err(|_| McpError::Timeout {
            operation: method.to_string(),
            timeout_ms: self.call_timeout_ms,
        })??;

        extract_result(&response)
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the `result` from a raw JSON-RPC response, converting `error` to `McpError`.
///
/// A `null` error counts as absent.
pub fn extract_result(response: &str) -> Result<Option<Value>, McpError> {
    let response: Value =
        serde_json::from_str(response).map_err(|e| McpError::MalformedResponse {
            reason: format!("response is not valid JSON: {e}"),
        })?;

    let envelope = response
        .as_object()
        .ok_or_else(|| McpError::MalformedResponse {
            reason: "response is not a JSON object".into(),
        })?;

    match envelope.get("error") {
        Some(error) if !error.is_null() => Err(protocol_error(error)),
        _ => Ok(envelope.get("result").cloned()),
    }
}

/// Build a `ProtocolError` from a JSON-RPC error object, whatever its shape.
fn protocol_error(error: &Value) -> McpError {
    let code = error
        .get("code")
        .and_then(Value::as_i64)
        .unwrap_or(error_codes::INTERNAL_ERROR);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(UNKNOWN_ERROR);

    McpError::ProtocolError {
        code,
        message: message.to_string(),
    }
}

/// Decode `result.tools`, keeping server order. Anything missing decodes as empty.
fn decode_tool_list(result: Option<&Value>) -> Vec<ToolContract> {
    let Some(tools) = result
        .and_then(|result| result.get("tools"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    tools.iter().map(decode_tool_contract).collect()
}

fn decode_tool_contract(tool: &Value) -> ToolContract {
    let text = |field: &str| {
        tool.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let input_schema = tool
        .get("inputSchema")
        .filter(|schema| !schema.is_null())
        .map(Value::to_string)
        .unwrap_or_else(|| EMPTY_SCHEMA.to_string());

    ToolContract {
        name: text("name"),
        description: text("description"),
        input_schema,
        output_schema: EMPTY_SCHEMA.to_string(),
        metadata: Default::default(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
