//! Tooling around the MCP client.
//!
//! This module handles:
//! - A host-maintained registry of locally implemented tools
//! - Before/after policy hooks wrapped around any tool invoker
//! - Trace events for auditing tool calls

pub mod policy;
pub mod registry;
pub mod trace;

// Re-exports for convenience
pub use policy::{AllowListPolicy, GuardedInvoker, Policy, PolicyPipeline, ToolInvoker};
pub use registry::{ToolHandler, ToolRegistry};
pub use trace::{LogTraceSink, MemoryTraceSink, TraceEvent, TracePolicy, TraceSink};
