//! Discover and invoke MCP tools exposed by an external server process.
//!
//! The server is spawned as a child process and spoken to with newline-delimited
//! JSON-RPC 2.0 over its stdin/stdout. Concurrent calls are correlated by
//! request ID, so responses may arrive in any order.
//!
//! ```no_run
//! use mcp_stdio::{McpClient, ServerConfig, ToolCall};
//!
//! # async fn run() -> Result<(), mcp_stdio::McpError> {
//! let config = ServerConfig::new("npx", ["-y", "@modelcontextprotocol/server-everything"]);
//! let client = McpClient::connect("everything", &config)?;
//!
//! for tool in client.list_tools().await? {
//!     println!("{}: {}", tool.name, tool.description);
//! }
//! let result = client
//!     .call_tool(&ToolCall::new("echo", r#"{"message":"hello"}"#))
//!     .await?;
//! println!("{}", result.result);
//!
//! client.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod mcp_client;
pub mod tooling;

pub use logging::{init_tracing, LogConfig};
pub use mcp_client::{
    load_servers_config, McpClient, McpError, McpServersConfig, ServerConfig, StdioTransport,
    ToolCall, ToolContract, ToolResult, Transport,
};
pub use tooling::{GuardedInvoker, Policy, PolicyPipeline, ToolInvoker, ToolRegistry};
