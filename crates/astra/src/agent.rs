use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::artifact::Artifact;
use crate::models::message::{Message, Role, ToolCall};
use crate::models::tool::Tool;
use crate::providers::base::{GenerateRequest, Provider, DEFAULT_CONTEXT_SIZE};
use crate::sandbox::Sandbox;
use crate::token_counter::truncate_message;
use crate::truncation::truncate_message_history;

pub mod context;
pub mod observer;
pub mod state;

pub use context::{AgentTool, ToolContext, ToolHandler, ToolOutput};
pub use observer::{AgentObserver, ToolCallEvent};
pub use state::{AgentContext, AgentState, SentinelStatus};

/// Token budget of a single artifact inside the context
const ARTIFACT_MAX_TOKENS: usize = 512;
/// Tokens kept free on top of the requested completion size
const STRIDE_RESERVE: usize = 512;

/// Parameters of one turn
#[derive(Debug, Clone, Default)]
pub struct AgentNextOptions {
    pub system_prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: Vec<AgentTool>,
    /// Hide every user message but the latest, and keep that one visible no
    /// matter how much history gets truncated
    pub only_one_user_message: bool,
}

/// Outcome of one turn
#[derive(Debug, Clone)]
pub struct AgentNext {
    pub agent: String,
    /// Messages the model generated this turn. Empty for tool resolution
    /// turns and for an empty history.
    pub messages: Vec<Message>,
}

/// A conversation engine: one message history driven one turn at a time
pub struct Agent {
    name: String,
    pub state: AgentState,
    provider: Arc<dyn Provider>,
    sandbox: Arc<dyn Sandbox>,
    observers: Vec<Arc<dyn AgentObserver>>,
    default_context_size: usize,
}

impl Agent {
    pub fn new<S: Into<String>>(
        name: S,
        provider: Arc<dyn Provider>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            name: name.into(),
            state: AgentState::new(),
            provider,
            sandbox,
            observers: Vec::new(),
            default_context_size: DEFAULT_CONTEXT_SIZE,
        }
    }

    /// Context size used when the provider does not report one
    pub fn with_default_context_size(mut self, size: usize) -> Self {
        self.default_context_size = size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Replace the whole state, e.g. to fork another engine's history
    pub fn with_state(&mut self, state: AgentState) -> &mut Self {
        self.state = state;
        self
    }

    pub fn subscribe(&mut self, observer: Arc<dyn AgentObserver>) {
        self.observers.push(observer);
    }

    /// Build the token-budgeted context for the next generation.
    pub fn build_context(&self, options: &AgentNextOptions) -> Result<Vec<Message>> {
        let tokenizer = self.provider.tokenizer();
        let max_context_size = self
            .provider
            .context_size()
            .unwrap_or(self.default_context_size);

        let mut history: Vec<&Message> = self.state.messages().iter().collect();

        let mut pinned: Option<Message> = None;
        if options.only_one_user_message {
            if let Some(last_user) = history.iter().rposition(|m| m.role == Role::User) {
                pinned = Some(history[last_user].clone());
                let mut index = 0;
                history.retain(|m| {
                    let keep = m.role != Role::User || index == last_user;
                    index += 1;
                    keep
                });
            }
        }

        let mut messages = Vec::with_capacity(history.len());
        for original in history {
            let mut message = original.clone();
            if message.role == Role::Tool {
                let mut parts = Vec::with_capacity(message.artifacts.len() + 1);
                for artifact in &message.artifacts {
                    parts.push(truncate_message(
                        &artifact.to_text(),
                        tokenizer,
                        ARTIFACT_MAX_TOKENS,
                    )?);
                }
                if let Some(error) = &message.error {
                    parts.push(error.clone());
                }
                message.content = Some(parts.join("\n"));
            }
            messages.push(message);
        }

        let stride = options.max_tokens.unwrap_or(0) as usize + STRIDE_RESERVE;
        let mut context =
            truncate_message_history(messages, tokenizer, max_context_size, stride)?;

        if let Some(pinned) = pinned {
            if !context.iter().any(|m| m.role == Role::User) {
                context.insert(0, pinned);
            }
        }

        context.insert(
            0,
            Message::system().with_text(options.system_prompt.trim()),
        );

        Ok(context)
    }

    /// Run one turn: resolve pending tool calls, or ask the model for the next message(s).
    ///
    /// Tool failures end up in the history as tool results. Only provider and
    /// tokenizer failures are returned as errors.
    pub async fn next(&mut self, options: &AgentNextOptions) -> Result<AgentNext> {
        self.state.iter += 1;
        debug!(agent = %self.name, "[next] iteration: {}", self.state.iter);

        let mut next = AgentNext {
            agent: self.name.clone(),
            messages: Vec::new(),
        };

        let Some(last) = self.state.messages().last() else {
            return Ok(next);
        };

        if last.has_pending_tool_calls() {
            let last = last.clone();
            self.handle_tool_calls(&options.tools, &last).await;
        } else {
            let context = self.build_context(options)?;
            let tools: Vec<Tool> = options.tools.iter().map(|t| t.tool.clone()).collect();
            debug!(
                agent = %self.name,
                "generating with {} context messages and {} tools",
                context.len(),
                tools.len()
            );
            let messages = self
                .provider
                .generate(GenerateRequest {
                    messages: &context,
                    max_tokens: options.max_tokens,
                    temperature: options.temperature,
                    tools: &tools,
                })
                .await?;
            debug!(agent = %self.name, "generated {} messages", messages.len());
            self.state.add_messages(messages.iter().cloned());
            next.messages = messages;
        }

        Ok(next)
    }

    async fn handle_tool_calls(&mut self, tools: &[AgentTool], message: &Message) {
        for call in &message.tool_calls {
            info!(
                agent = %self.name,
                "Running tool {} with args: {}",
                call.tool,
                serde_json::to_string(&call.args).unwrap_or_default()
            );

            let (artifacts, error) = match self.run_tool(tools, message, call).await {
                Ok(artifacts) => {
                    info!(agent = %self.name, "Tool {} finished", call.tool);
                    debug!(
                        agent = %self.name,
                        "{}",
                        artifacts.iter().map(Artifact::to_text).collect::<Vec<_>>().join("\n")
                    );
                    (artifacts, None)
                }
                Err(e) => {
                    warn!(agent = %self.name, "Tool {} failed\n{}", call.tool, e);
                    (Vec::new(), Some(e.to_string()))
                }
            };

            self.state
                .add_message(Message::tool_result(call.id.clone(), artifacts, error));
        }
    }

    async fn run_tool(
        &mut self,
        tools: &[AgentTool],
        message: &Message,
        call: &ToolCall,
    ) -> AgentResult<Vec<Artifact>> {
        let tool = tools
            .iter()
            .find(|t| t.id() == call.tool)
            .ok_or_else(|| AgentError::ToolNotFound(call.tool.clone()))?;

        let mut ctx = ToolContext::new(
            call.args.to_map(),
            &self.name,
            &mut self.state,
            &tool.tool,
            (message.clone(), call.clone()),
            self.sandbox.clone(),
        )?;

        let event = ToolCallEvent {
            agent: self.name.clone(),
            callee: call.clone(),
            tool: tool.tool.clone(),
            args: ctx.args.clone(),
        };
        for observer in &self.observers {
            observer.on_tool_call(&event).await;
        }

        tool.call(&mut ctx).await?;
        Ok(ctx.out.into_artifacts())
    }

    /// Ask every observer to stop. Callers check for it between turns.
    pub async fn stop_immediately(&self) {
        for observer in &self.observers {
            observer.on_stop_immediately(&self.name).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolArgument;
    use crate::providers::mock::{MockProvider, MockSandbox};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
            let message = ctx.str_arg("message")?.to_string();
            ctx.out.text(message);
            Ok(())
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl ToolHandler for BrokenTool {
        async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
            ctx.out.text("partial output");
            Err(AgentError::ExecutionError("disk full".into()))
        }
    }

    fn echo_tool() -> AgentTool {
        AgentTool::new(
            Tool::new("echo")
                .with_description("Echoes back the input")
                .with_argument(ToolArgument::string("message").required()),
            EchoTool,
        )
    }

    fn broken_tool() -> AgentTool {
        AgentTool::new(Tool::new("broken"), BrokenTool)
    }

    fn agent(provider: Arc<MockProvider>) -> Agent {
        Agent::new("main", provider, Arc::new(MockSandbox::new()))
    }

    fn options(tools: Vec<AgentTool>) -> AgentNextOptions {
        AgentNextOptions {
            system_prompt: "  You are a test.  ".into(),
            max_tokens: Some(100),
            temperature: Some(0.5),
            tools,
            only_one_user_message: false,
        }
    }

    fn call(id: &str, tool: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, tool, args)
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl AgentObserver for Recorder {
        async fn on_tool_call(&self, event: &ToolCallEvent) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", event.agent, event.tool.id));
        }

        async fn on_stop_immediately(&self, _agent: &str) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_empty_history_is_a_noop() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider.clone());

        let next = agent.next(&options(vec![])).await?;

        assert!(next.messages.is_empty());
        assert_eq!(agent.state.iter, 1);
        assert!(provider.requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_simple_response() -> Result<()> {
        let reply = Message::assistant().with_text("Hello!");
        let provider = Arc::new(MockProvider::new(vec![reply.clone()]));
        let mut agent = agent(provider.clone());
        agent.state.add_message(Message::user().with_text("hi"));

        let next = agent.next(&options(vec![echo_tool()])).await?;

        assert_eq!(next.messages, vec![reply.clone()]);
        assert_eq!(agent.state.messages().last(), Some(&reply));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let context = &requests[0].messages;
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[0].text(), "You are a test.");
        assert_eq!(context[1].text(), "hi");
        assert_eq!(requests[0].max_tokens, Some(100));
        assert_eq!(requests[0].temperature, Some(0.5));
        assert_eq!(requests[0].tools, vec!["echo".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_call_round() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider.clone());
        let recorder = Arc::new(Recorder::default());
        agent.subscribe(recorder.clone());
        agent.state.add_message(Message::user().with_text("Echo test"));
        agent.state.add_message(
            Message::assistant().with_tool_call(call("1", "echo", json!({"message": "test"}))),
        );

        let next = agent.next(&options(vec![echo_tool()])).await?;

        assert!(next.messages.is_empty());
        assert!(provider.requests().is_empty());
        let result = agent.state.messages().last().unwrap();
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("1"));
        assert_eq!(result.artifacts, vec![Artifact::text("test")]);
        assert_eq!(result.error, None);
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["main:echo".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_failures_are_isolated() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider);
        agent.state.add_message(Message::user().with_text("go"));
        agent.state.add_message(
            Message::assistant()
                .with_tool_call(call("1", "broken", json!({})))
                .with_tool_call(call("2", "missing", json!({})))
                .with_tool_call(call("3", "echo", json!({})))
                .with_tool_call(call("4", "echo", json!({"message": "ok"}))),
        );
        let before = agent.state.messages().len();

        agent.next(&options(vec![echo_tool(), broken_tool()])).await?;

        let results = &agent.state.messages()[before..];
        assert_eq!(results.len(), 4);

        assert_eq!(results[0].error.as_deref(), Some("disk full"));
        assert!(results[0].artifacts.is_empty());
        assert_eq!(results[1].error.as_deref(), Some("Tool missing not found"));
        assert_eq!(
            results[2].error.as_deref(),
            Some("Missing required argument: message")
        );
        assert_eq!(results[3].error, None);
        assert_eq!(results[3].artifacts, vec![Artifact::text("ok")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_results_are_rendered_into_context() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider.clone());
        agent.state.add_message(Message::user().with_text("go"));
        agent.state.add_message(
            Message::assistant().with_tool_call(call("1", "exec", json!({}))),
        );
        agent.state.add_message(Message::tool_result(
            "1",
            vec![
                Artifact::command(None, "x".repeat(600), 1),
                Artifact::text("second"),
            ],
            Some("boom".into()),
        ));

        agent.next(&options(vec![])).await?;

        let context = &provider.requests()[0].messages;
        let rendered = context.last().unwrap().text();
        let expected_first = format!(
            "Exit code: 1\n{}... [truncated, 101 tokens left]",
            "x".repeat(512 - "Exit code: 1\n".len())
        );
        assert_eq!(rendered, format!("{}\nsecond\nboom", expected_first));
        Ok(())
    }

    #[tokio::test]
    async fn test_pinned_user_message_survives_truncation() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![]).with_context_size(Some(1000)));
        let mut agent = agent(provider.clone());
        agent.state.add_message(Message::user().with_text("old task"));
        agent.state.add_message(Message::user().with_text("the task"));
        for _ in 0..5 {
            agent.state.add_message(Message::assistant().with_text("y".repeat(200)));
        }

        let mut opts = options(vec![]);
        opts.max_tokens = Some(0);
        opts.only_one_user_message = true;
        let context = agent.build_context(&opts)?;

        assert_eq!(context[0].role, Role::System);
        assert_eq!(context[1].text(), "the task");
        assert!(context.iter().all(|m| m.text() != "old task"));
        let assistant_tokens: usize = context[2..].iter().map(|m| m.text().len()).sum();
        assert!(assistant_tokens + 512 <= 1000);
        Ok(())
    }

    #[tokio::test]
    async fn test_context_never_ends_with_pending_call() -> Result<()> {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider);
        agent.state.add_message(Message::user().with_text("hi"));
        agent.state.add_message(
            Message::assistant().with_tool_call(call("1", "echo", json!({"message": "x"}))),
        );

        let context = agent.build_context(&options(vec![]))?;

        assert_eq!(context.len(), 2);
        assert!(!context.last().unwrap().has_pending_tool_calls());
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let provider = Arc::new(MockProvider::new(vec![]).failing_when_exhausted());
        let mut agent = agent(provider);
        agent.state.add_message(Message::user().with_text("hi"));

        let err = agent.next(&options(vec![])).await.unwrap_err();

        assert_eq!(err.to_string(), "connection closed");
        assert_eq!(agent.state.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_immediately_reaches_every_observer() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut agent = agent(provider);
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        agent.subscribe(first.clone());
        agent.subscribe(second.clone());

        agent.stop_immediately().await;

        assert_eq!(first.stops.load(Ordering::SeqCst), 1);
        assert_eq!(second.stops.load(Ordering::SeqCst), 1);
    }
}
