//! JSON-RPC over stdio for MCP tool servers.
//!
//! This module handles:
//! - Spawning and owning an MCP server child process
//! - JSON-RPC 2.0 communication over process stdio, correlated by request ID
//! - Tool discovery (`tools/list`) and invocation (`tools/call`)
//! - Deterministic teardown that leaves no caller waiting
//! - Loading server launch configs from JSON or YAML

pub mod client;
pub mod config;
pub mod errors;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::McpClient;
pub use config::load_servers_config;
pub use errors::McpError;
pub use transport::{StdioTransport, Transport};
pub use types::{McpServersConfig, ServerConfig, ToolCall, ToolContract, ToolResult};
