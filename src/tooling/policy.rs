//! Policy hooks around tool invocation.
//!
//! A [`PolicyPipeline`] runs every policy's `before` hook in order, then the
//! invocation, then every `after` hook in order. The first error stops the
//! pipeline; a rejected call never reaches the tool.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::ToolRegistry;
use crate::mcp_client::{McpClient, McpError, ToolCall, ToolResult, Transport};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Hook invoked around each tool call (validation, allow-listing, auditing).
#[async_trait]
pub trait Policy: Send + Sync {
    /// Called before the tool runs. An error aborts the call.
    async fn before_tool_call(&self, _call: &ToolCall) -> Result<(), McpError> {
        Ok(())
    }

    /// Called after the tool returned successfully.
    async fn after_tool_call(&self, _call: &ToolCall, _result: &ToolResult) -> Result<(), McpError> {
        Ok(())
    }
}

/// Ordered list of policies.
#[derive(Clone, Default)]
pub struct PolicyPipeline {
    policies: Vec<Arc<dyn Policy>>,
}

impl PolicyPipeline {
    pub fn new(policies: Vec<Arc<dyn Policy>>) -> Self {
        Self { policies }
    }

    /// Append a policy; it runs after the ones already present.
    pub fn push(&mut self, policy: Arc<dyn Policy>) {
        self.policies.push(policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub async fn run_before(&self, call: &ToolCall) -> Result<(), McpError> {
        for policy in &self.policies {
            policy.before_tool_call(call).await?;
        }
        Ok(())
    }

    pub async fn run_after(&self, call: &ToolCall, result: &ToolResult) -> Result<(), McpError> {
        for policy in &self.policies {
            policy.after_tool_call(call, result).await?;
        }
        Ok(())
    }
}

/// Rejects any tool whose name is not in the allow list.
#[derive(Debug, Clone)]
pub struct AllowListPolicy {
    allowed: HashSet<String>,
}

impl AllowListPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Policy for AllowListPolicy {
    async fn before_tool_call(&self, call: &ToolCall) -> Result<(), McpError> {
        if self.allowed.contains(&call.name) {
            return Ok(());
        }
        tracing::warn!(tool = %call.name, "tool call blocked by allow list");
        Err(McpError::PolicyRejected {
            tool: call.name.clone(),
            reason: "tool is not in the allow list".into(),
        })
    }
}

// ─── Invokers ────────────────────────────────────────────────────────────────

/// Anything that can execute a [`ToolCall`]: a remote server or a local registry.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, McpError>;
}

#[async_trait]
impl<T: Transport> ToolInvoker for McpClient<T> {
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, McpError> {
        self.call_tool(call).await
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, McpError> {
        self.call_tool(call).await
    }
}

/// Wraps an invoker with a policy pipeline.
pub struct GuardedInvoker<I> {
    inner: I,
    pipeline: PolicyPipeline,
}

impl<I: ToolInvoker> GuardedInvoker<I> {
    pub fn new(inner: I, pipeline: PolicyPipeline) -> Self {
        Self { inner, pipeline }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub fn pipeline(&self) -> &PolicyPipeline {
        &self.pipeline
    }
}

#[async_trait]
impl<I: ToolInvoker> ToolInvoker for GuardedInvoker<I> {
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, McpError> {
        self.pipeline.run_before(call).await?;
        let result = self.inner.invoke(call).await?;
        self.pipeline.run_after(call, &result).await?;
        Ok(result)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// Appends `"<label>:before:<tool>"` / `"<label>:after:<tool>"` to a shared log.
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Policy for Recorder {
        async fn before_tool_call(&self, call: &ToolCall) -> Result<(), McpError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:before:{}", self.label, call.name));
            Ok(())
        }

        async fn after_tool_call(&self, call: &ToolCall, _result: &ToolResult) -> Result<(), McpError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:after:{}", self.label, call.name));
            Ok(())
        }
    }

    fn counting_registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register("ping", "Reply with pong", json!({}), move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("pong"))
                }
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_pipeline_runs_hooks_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PolicyPipeline::new(vec![
            Arc::new(Recorder {
                label: "first",
                log: Arc::clone(&log),
            }) as Arc<dyn Policy>,
            Arc::new(Recorder {
                label: "second",
                log: Arc::clone(&log),
            }),
        ]);
        let invoker = GuardedInvoker::new(counting_registry(Arc::default()), pipeline);

        let result = invoker.invoke(&ToolCall::new("ping", "{}")).await.unwrap();

        assert_eq!(result.result, r#""pong""#);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:before:ping",
                "second:before:ping",
                "first:after:ping",
                "second:after:ping",
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_call_never_reaches_the_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = PolicyPipeline::default();
        pipeline.push(Arc::new(AllowListPolicy::new(["other"])));
        let invoker = GuardedInvoker::new(counting_registry(Arc::clone(&calls)), pipeline);

        let err = invoker.invoke(&ToolCall::new("ping", "{}")).await.unwrap_err();

        assert!(matches!(err, McpError::PolicyRejected { ref tool, .. } if tool == "ping"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allow_list_permits_listed_tools() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline =
            PolicyPipeline::new(vec![Arc::new(AllowListPolicy::new(["ping"])) as Arc<dyn Policy>]);
        let invoker = GuardedInvoker::new(counting_registry(Arc::clone(&calls)), pipeline);

        invoker.invoke(&ToolCall::new("ping", "{}")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(invoker.pipeline().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_pipeline_passes_through() {
        let invoker = GuardedInvoker::new(counting_registry(Arc::default()), PolicyPipeline::default());
        assert!(invoker.pipeline().is_empty());

        let err = invoker.invoke(&ToolCall::new("missing", "{}")).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }
}
