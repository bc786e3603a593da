//! Host-maintained map from tool name to handler and schema.
//!
//! Populated at startup with explicit `register` calls. Each entry yields a
//! [`ToolContract`] for discovery and dispatches [`ToolCall`]s to its handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::mcp_client::types::EMPTY_SCHEMA;
use crate::mcp_client::{McpError, ToolCall, ToolContract, ToolResult};

/// Async tool implementation: parsed arguments in, JSON result out.
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, McpError>> + Send + Sync>;

struct RegisteredTool {
    contract: ToolContract,
    handler: ToolHandler,
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Locally implemented tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with an input schema and no declared output schema.
    pub fn register<F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: F,
    ) -> Result<(), McpError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, McpError>> + Send + 'static,
    {
        self.register_with_output(name, description, input_schema, None, handler)
    }

    /// Register a tool, optionally declaring the shape of its result.
    pub fn register_with_output<F, Fut>(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        output_schema: Option<Value>,
        handler: F,
    ) -> Result<(), McpError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, McpError>> + Send + 'static,
    {
        if self.tools.contains_key(name) {
            return Err(McpError::DuplicateTool {
                name: name.to_string(),
            });
        }

        let contract = ToolContract {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: input_schema.to_string(),
            output_schema: output_schema
                .map(|schema| schema.to_string())
                .unwrap_or_else(|| EMPTY_SCHEMA.to_string()),
            metadata: HashMap::new(),
        };
        let handler: ToolHandler = Arc::new(move |arguments| handler(arguments).boxed());

        self.tools
            .insert(name.to_string(), RegisteredTool { contract, handler });
        tracing::debug!(tool = name, "registered tool");
        Ok(())
    }

    /// Remove a tool. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Look up a tool's contract by name.
    pub fn get(&self, name: &str) -> Option<&ToolContract> {
        self.tools.get(name).map(|tool| &tool.contract)
    }

    /// All contracts, sorted by tool name.
    pub fn contracts(&self) -> Vec<ToolContract> {
        let mut contracts: Vec<ToolContract> = self
            .tools
            .values()
            .map(|tool| tool.contract.clone())
            .collect();
        contracts.sort_by(|a, b| a.name.cmp(&b.name));
        contracts
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call to its handler.
    pub async fn call_tool(&self, call: &ToolCall) -> Result<ToolResult, McpError> {
        let tool = self.tools.get(&call.name).ok_or(McpError::UnknownTool {
            name: call.name.clone(),
        })?;

        let arguments: Value =
            serde_json::from_str(&call.arguments).map_err(|e| McpError::InvalidArguments {
                tool: call.name.clone(),
                reason: format!("arguments are not valid JSON: {e}"),
            })?;

        let result = (tool.handler)(arguments).await?;
        Ok(ToolResult::new(call.name.clone(), result.to_string()))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
