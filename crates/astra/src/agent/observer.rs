use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::message::ToolCall;
use crate::models::tool::Tool;

/// Emitted right before a tool implementation runs
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    /// Name of the engine running the tool
    pub agent: String,
    pub callee: ToolCall,
    pub tool: Tool,
    /// Validated arguments the tool is about to receive
    pub args: Map<String, Value>,
}

/// Lifecycle listener registered on one engine
#[async_trait]
pub trait AgentObserver: Send + Sync {
    async fn on_tool_call(&self, _event: &ToolCallEvent) {}

    /// Cooperative stop request. Nothing in flight is interrupted.
    async fn on_stop_immediately(&self, _agent: &str) {}
}
