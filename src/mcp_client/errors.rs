//! MCP Client error types.
//!
//! Malformed incoming lines and process termination never show up here: the
//! read loop absorbs them and logs. Everything below is surfaced to a caller.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The server process has already exited; nothing was written.
    #[error("server '{server}' is not connected")]
    NotConnected {
        server: String,
    },

    /// I/O error on the server's pipes.
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// The outgoing JSON-RPC envelope could not be parsed or re-serialized.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        reason: String,
    },

    /// A response handed back by the transport is not a JSON-RPC object.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("protocol error [{code}]: {message}")]
    ProtocolError {
        code: i64,
        message: String,
    },

    /// Tool call arguments are not valid JSON.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        reason: String,
    },

    /// The wait for a response was cancelled by the caller or by disposal.
    #[error("request cancelled")]
    Cancelled,

    /// The client's call deadline fired before a response arrived.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// Tool not found in a local registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// A tool with the same name is already registered.
    #[error("tool '{name}' is already registered")]
    DuplicateTool {
        name: String,
    },

    /// A policy hook refused the call.
    #[error("policy rejected '{tool}': {reason}")]
    PolicyRejected {
        tool: String,
        reason: String,
    },

    /// Configuration error (missing servers, bad config file).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl McpError {
    /// Whether the wait was abandoned (caller cancellation, deadline, or disposal).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, McpError::Cancelled | McpError::Timeout { .. })
    }

    /// Whether the server answered with a JSON-RPC `error` object.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, McpError::ProtocolError { .. })
    }
}
