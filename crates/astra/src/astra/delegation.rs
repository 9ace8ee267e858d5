use anyhow::Result;
use async_trait::async_trait;
use indoc::indoc;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::prompts::{summary_prompt, worker_system_prompt};
use super::AstraEvent;
use crate::agent::{Agent, AgentNextOptions, AgentTool, SentinelStatus, ToolContext, ToolHandler};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolArgument};
use crate::settings::{GenerationSettings, Settings};
use crate::toolkit::Toolkit;
use crate::truncation::{has_any_tool_call, remove_tool_calls};

pub const WORKER_STATUSES: [SentinelStatus; 2] = [SentinelStatus::Done, SentinelStatus::Failed];
pub const VERIFICATION_STATUSES: [SentinelStatus; 2] =
    [SentinelStatus::Correct, SentinelStatus::Incorrect];

const NO_RESULTS: &str = "No results";

/// Progress of one delegated task
#[derive(Debug, Clone, PartialEq)]
pub enum DelegationPhase {
    /// The worker is still taking turns
    Collecting,
    Terminal(SentinelStatus),
    Summarizing(SentinelStatus),
    Complete(String),
}

/// Terminal status of a sentinel loop, if it has reached one.
///
/// A status outside `terminal` does not end the loop; only the iteration
/// limit bounds it then.
pub fn detect_terminal(
    status: Option<SentinelStatus>,
    terminal: &[SentinelStatus],
    iter: u32,
    max_iters: u32,
) -> Option<SentinelStatus> {
    match status {
        Some(status) if terminal.contains(&status) => Some(status),
        _ if iter > max_iters => Some(SentinelStatus::Timeout),
        _ => None,
    }
}

/// Whether a loop keeps going without checking for termination
pub fn should_continue(messages: &[Message]) -> bool {
    has_any_tool_call(messages)
}

pub(crate) fn next_options(
    system_prompt: String,
    generation: GenerationSettings,
    tools: Vec<AgentTool>,
) -> AgentNextOptions {
    AgentNextOptions {
        system_prompt,
        max_tokens: Some(generation.max_tokens),
        temperature: Some(generation.temperature),
        tools,
        only_one_user_message: true,
    }
}

struct SentinelTool {
    status: SentinelStatus,
    /// Record the `description` argument as the loop results
    records_description: bool,
}

#[async_trait]
impl ToolHandler for SentinelTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        if self.records_description {
            let description = ctx.opt_str_arg("description").unwrap_or_default().to_string();
            ctx.state.set_results(description);
        }
        ctx.state.set_status(self.status);
        Ok(())
    }
}

pub fn done_tool() -> AgentTool {
    AgentTool::new(
        Tool::new("done").with_description("Mark the task as done"),
        SentinelTool {
            status: SentinelStatus::Done,
            records_description: false,
        },
    )
}

pub fn failed_tool() -> AgentTool {
    AgentTool::new(
        Tool::new("failed").with_description("Mark the task as failed"),
        SentinelTool {
            status: SentinelStatus::Failed,
            records_description: false,
        },
    )
}

pub fn correct_tool() -> AgentTool {
    AgentTool::new(
        Tool::new("correct")
            .with_description("Mark the results as done")
            .with_argument(
                ToolArgument::string("description")
                    .required()
                    .with_description("Describe why you succeeded."),
            ),
        SentinelTool {
            status: SentinelStatus::Correct,
            records_description: true,
        },
    )
}

pub fn incorrect_tool() -> AgentTool {
    AgentTool::new(
        Tool::new("incorrect")
            .with_description("Mark the results as incorrect")
            .with_argument(
                ToolArgument::string("description")
                    .required()
                    .with_description("Describe the reason you failed."),
            ),
        SentinelTool {
            status: SentinelStatus::Incorrect,
            records_description: true,
        },
    )
}

/// The engines a main turn delegates to, shared with the `delegate_task` tool
pub(crate) struct Delegator {
    pub(crate) worker: Mutex<Agent>,
    pub(crate) summary: Mutex<Agent>,
    pub(crate) verification: Mutex<Agent>,
    pub(crate) toolkit: Toolkit,
    pub(crate) settings: Settings,
    events: broadcast::Sender<AstraEvent>,
}

impl Delegator {
    pub(crate) fn new(
        worker: Agent,
        summary: Agent,
        verification: Agent,
        toolkit: Toolkit,
        settings: Settings,
        events: broadcast::Sender<AstraEvent>,
    ) -> Self {
        Self {
            worker: Mutex::new(worker),
            summary: Mutex::new(summary),
            verification: Mutex::new(verification),
            toolkit,
            settings,
            events,
        }
    }

    pub(crate) fn emit_task(&self, task: Option<String>) {
        // No receivers is fine
        let _ = self.events.send(AstraEvent::Task { task });
        self.emit_job(None);
    }

    pub(crate) fn emit_job(&self, job: Option<String>) {
        let _ = self.events.send(AstraEvent::Job { job });
    }

    fn worker_tools(&self) -> Vec<AgentTool> {
        let mut tools = self.toolkit.worker_tools();
        tools.push(failed_tool());
        tools.push(done_tool());
        tools
    }

    /// Run `task` on the worker until it finishes, then summarize the outcome.
    pub(crate) async fn delegate(&self, task: &str) -> Result<String> {
        let mut worker = self.worker.lock().await;
        worker
            .state
            .add_message(Message::user().with_text(format!("<task>\n{}\n</task>", task)));
        worker.state.iter = 0;
        worker.state.clear_outcome();

        let cutoff = worker.provider().knowledge_cutoff();
        let options = next_options(
            worker_system_prompt(cutoff)?,
            self.settings.worker,
            self.worker_tools(),
        );

        let mut phase = DelegationPhase::Collecting;
        loop {
            phase = match phase {
                DelegationPhase::Collecting => {
                    let next = worker.next(&options).await?;
                    if should_continue(&next.messages) {
                        DelegationPhase::Collecting
                    } else {
                        match detect_terminal(
                            worker.state.status(),
                            &WORKER_STATUSES,
                            worker.state.iter,
                            self.settings.task_max_iters,
                        ) {
                            Some(status) => DelegationPhase::Terminal(status),
                            None => DelegationPhase::Collecting,
                        }
                    }
                }
                DelegationPhase::Terminal(status) => {
                    info!(agent = %worker.name(), "Task finished with status {}", status);
                    let messages = std::mem::take(&mut worker.state.ctx.messages);
                    worker.state.ctx.messages = remove_tool_calls(messages, &["done", "failed"]);
                    DelegationPhase::Summarizing(status)
                }
                DelegationPhase::Summarizing(status) => {
                    let text = self.summarize(&worker, status, task, &options).await?;
                    DelegationPhase::Complete(text)
                }
                DelegationPhase::Complete(text) => return Ok(text),
            };
        }
    }

    async fn summarize(
        &self,
        worker: &Agent,
        status: SentinelStatus,
        task: &str,
        worker_options: &AgentNextOptions,
    ) -> Result<String> {
        let mut summary = self.summary.lock().await;
        summary.with_state(worker.state.clone());
        summary
            .state
            .add_message(Message::user().with_text(summary_prompt(status, task)?));

        self.emit_job(Some("getting results".into()));
        let options = AgentNextOptions {
            max_tokens: Some(self.settings.summary.max_tokens),
            temperature: Some(self.settings.summary.temperature),
            tools: Vec::new(),
            ..worker_options.clone()
        };
        let next = summary.next(&options).await?;
        self.emit_job(Some(status.to_string()));

        let text = next
            .messages
            .first()
            .and_then(|message| message.content.clone())
            .unwrap_or_else(|| NO_RESULTS.to_string());
        debug!(agent = %summary.name(), "Summary: {}", text);
        Ok(text)
    }
}

pub(crate) struct DelegateTaskTool {
    pub(crate) delegator: Arc<Delegator>,
}

pub(crate) fn delegate_task(delegator: Arc<Delegator>) -> AgentTool {
    AgentTool::new(
        Tool::new("delegate_task")
            .with_description(indoc! {"
                Delegates a task to some worker.
                Workers do not have any insight into this conversation.
                Workers have full capabilities and operate in a sandbox with Linux.
                You share the file system with workers."})
            .with_argument(
                ToolArgument::string("description")
                    .required()
                    .with_description("Short task description."),
            )
            .with_argument(
                ToolArgument::string("context").required().with_description(
                    "Fully exhaustive task description including any relevant information.",
                ),
            )
            .with_argument(
                ToolArgument::string("input_files")
                    .with_description("Task relevant input files. Must be absolute paths."),
            )
            .with_argument(
                ToolArgument::string("output_files")
                    .with_description("Task relevant output files. Must be absolute paths."),
            )
            .with_argument(ToolArgument::string("urls").with_description("Task relevant urls.")),
        DelegateTaskTool { delegator },
    )
}

#[async_trait]
impl ToolHandler for DelegateTaskTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let task = serde_json::to_string_pretty(&ctx.args)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        let description = match ctx.opt_str_arg("context") {
            Some(context) => context.to_string(),
            None => serde_json::to_string(&ctx.args)
                .map_err(|e| AgentError::Internal(e.to_string()))?,
        };
        self.delegator.emit_task(Some(description));

        let text = self.delegator.delegate(&task).await?;
        ctx.out.text(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_status_ends_loop() {
        assert_eq!(
            detect_terminal(Some(SentinelStatus::Done), &WORKER_STATUSES, 1, 20),
            Some(SentinelStatus::Done)
        );
        assert_eq!(
            detect_terminal(Some(SentinelStatus::Failed), &WORKER_STATUSES, 30, 20),
            Some(SentinelStatus::Failed)
        );
    }

    #[test]
    fn test_iteration_limit_times_out() {
        assert_eq!(detect_terminal(None, &WORKER_STATUSES, 20, 20), None);
        assert_eq!(
            detect_terminal(None, &WORKER_STATUSES, 21, 20),
            Some(SentinelStatus::Timeout)
        );
    }

    #[test]
    fn test_foreign_status_keeps_loop_running() {
        assert_eq!(
            detect_terminal(Some(SentinelStatus::Correct), &WORKER_STATUSES, 3, 20),
            None
        );
        assert_eq!(
            detect_terminal(Some(SentinelStatus::Done), &VERIFICATION_STATUSES, 21, 20),
            Some(SentinelStatus::Timeout)
        );
    }

    #[test]
    fn test_tool_calls_continue_the_loop() {
        use crate::models::message::ToolCall;
        use serde_json::json;

        assert!(!should_continue(&[]));
        assert!(!should_continue(&[Message::assistant().with_text("thinking")]));
        assert!(should_continue(&[Message::assistant()
            .with_tool_call(ToolCall::new("1", "exec", json!({"command": "ls"})))]));
    }
}
