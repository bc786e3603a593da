//! Trace events for observability and replay of tool calls.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::Policy;
use crate::mcp_client::{McpError, ToolCall, ToolResult};

/// Event kind written before a tool runs.
pub const KIND_BEFORE_CALL: &str = "tool_call.before";

/// Event kind written after a tool returned.
pub const KIND_AFTER_CALL: &str = "tool_call.after";

/// One captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: Uuid,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub payload_json: String,
}

impl TraceEvent {
    /// Stamp a new event with a fresh ID and the current time.
    pub fn new(kind: &str, payload: &serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            timestamp: Utc::now(),
            payload_json: payload.to_string(),
        }
    }
}

/// Receives trace events.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn write(&self, event: TraceEvent) -> Result<(), McpError>;
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceSink;

#[async_trait]
impl TraceSink for LogTraceSink {
    async fn write(&self, event: TraceEvent) -> Result<(), McpError> {
        tracing::info!(
            event_id = %event.id,
            kind = %event.kind,
            timestamp = %event.timestamp.to_rfc3339(),
            payload = %event.payload_json,
            "trace event"
        );
        Ok(())
    }
}

/// Keeps events in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn write(&self, event: TraceEvent) -> Result<(), McpError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

/// Policy that records every call and result to a sink.
#[derive(Clone)]
pub struct TracePolicy {
    sink: Arc<dyn TraceSink>,
}

impl TracePolicy {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Policy for TracePolicy {
    async fn before_tool_call(&self, call: &ToolCall) -> Result<(), McpError> {
        let payload = serde_json::json!({
            "tool": call.name,
            "arguments": call.arguments,
        });
        self.sink
            .write(TraceEvent::new(KIND_BEFORE_CALL, &payload))
            .await
    }

    async fn after_tool_call(&self, call: &ToolCall, result: &ToolResult) -> Result<(), McpError> {
        let payload = serde_json::json!({
            "tool": call.name,
            "result": result.result,
        });
        self.sink
            .write(TraceEvent::new(KIND_AFTER_CALL, &payload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tooling::policy::{GuardedInvoker, PolicyPipeline, ToolInvoker};
    use crate::tooling::registry::ToolRegistry;

    #[tokio::test]
    async fn test_trace_policy_records_before_and_after() {
        let mut registry = ToolRegistry::new();
        registry
            .register("echo", "Echo", json!({}), |args| async move { Ok(args) })
            .unwrap();

        let sink = Arc::new(MemoryTraceSink::new());
        let pipeline =
            PolicyPipeline::new(vec![Arc::new(TracePolicy::new(sink.clone())) as Arc<dyn Policy>]);
        let invoker = GuardedInvoker::new(registry, pipeline);

        invoker
            .invoke(&ToolCall::new("echo", r#"{"message":"hi"}"#))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, KIND_BEFORE_CALL);
        assert_eq!(events[1].kind, KIND_AFTER_CALL);
        assert!(events[0].timestamp <= events[1].timestamp);
        assert_ne!(events[0].id, events[1].id);

        let after: serde_json::Value = serde_json::from_str(&events[1].payload_json).unwrap();
        assert_eq!(after["tool"], "echo");
        assert_eq!(after["result"], r#"{"message":"hi"}"#);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_events() {
        let event = TraceEvent::new("custom", &json!({"n": 1}));
        LogTraceSink.write(event).await.unwrap();
    }
}
