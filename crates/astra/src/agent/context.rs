use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::state::AgentState;
use crate::errors::{AgentError, AgentResult};
use crate::models::artifact::Artifact;
use crate::models::message::{Message, ToolCall};
use crate::models::tool::Tool;
use crate::sandbox::Sandbox;

/// Ordered artifacts produced by one tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    artifacts: Vec<Artifact>,
}

impl ToolOutput {
    pub fn add(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }

    pub fn text<S: Into<String>>(&mut self, text: S) {
        self.add(Artifact::text(text));
    }

    pub fn json(&mut self, data: Value) {
        self.add(Artifact::json(data));
    }

    pub fn image(&mut self, buffer: Vec<u8>, description: Option<String>) {
        self.add(Artifact::image(buffer, description));
    }

    pub fn command<S: Into<String>>(&mut self, command: Option<String>, stdout: S, exit_code: i32) {
        self.add(Artifact::command(command, stdout, exit_code));
    }

    /// Objects, arrays and null become JSON, everything else text
    pub fn any(&mut self, data: Value) {
        match data {
            Value::Object(_) | Value::Array(_) | Value::Null => self.json(data),
            Value::String(text) => self.text(text),
            other => self.text(other.to_string()),
        }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts
    }
}

/// Everything a tool implementation gets to see while it runs
pub struct ToolContext<'a> {
    /// Validated arguments with defaults filled in
    pub args: Map<String, Value>,
    /// Name of the invoking engine
    pub agent: &'a str,
    /// State of the invoking engine
    pub state: &'a mut AgentState,
    pub tool: &'a Tool,
    /// The assistant message and call that requested this invocation
    pub callee: (Message, ToolCall),
    pub sandbox: Arc<dyn Sandbox>,
    pub out: ToolOutput,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        args: Map<String, Value>,
        agent: &'a str,
        state: &'a mut AgentState,
        tool: &'a Tool,
        callee: (Message, ToolCall),
        sandbox: Arc<dyn Sandbox>,
    ) -> AgentResult<Self> {
        let args = tool.parse_arguments(args)?;
        Ok(Self {
            args,
            agent,
            state,
            tool,
            callee,
            sandbox,
            out: ToolOutput::default(),
        })
    }

    pub fn str_arg(&self, name: &str) -> AgentResult<&str> {
        self.opt_str_arg(name)
            .ok_or_else(|| AgentError::MissingArgument(name.to_string()))
    }

    pub fn opt_str_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()>;
}

/// A tool descriptor paired with its implementation
#[derive(Clone)]
pub struct AgentTool {
    pub tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

impl AgentTool {
    pub fn new(tool: Tool, handler: impl ToolHandler + 'static) -> Self {
        Self {
            tool,
            handler: Arc::new(handler),
        }
    }

    pub fn id(&self) -> &str {
        &self.tool.id
    }

    pub async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        self.handler.call(ctx).await
    }
}

impl fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentTool").field("tool", &self.tool).finish()
    }
}
