use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::delegation::{
    correct_tool, detect_terminal, incorrect_tool, next_options, should_continue, Delegator,
    VERIFICATION_STATUSES,
};
use super::prompts::{verification_prompt, worker_system_prompt};
use crate::agent::{AgentState, SentinelStatus};
use crate::models::message::Message;
use crate::truncation::remove_tool_calls;

/// Verdict of the verification engine on some task results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub correct: bool,
    /// Rationale the engine gave with its verdict
    pub text: Option<String>,
}

impl Delegator {
    /// Check `results` against `task` on a fresh verification engine.
    pub(crate) async fn verify(&self, task: &str, results: &str) -> Result<Verification> {
        self.emit_job(Some("verifying results".into()));

        let mut verifier = self.verification.lock().await;
        verifier.with_state(AgentState::new());
        verifier
            .state
            .add_message(Message::user().with_text(verification_prompt(task, results)?));

        let mut tools = self.toolkit.verification_tools();
        tools.push(incorrect_tool());
        tools.push(correct_tool());
        let cutoff = verifier.provider().knowledge_cutoff();
        let options = next_options(
            worker_system_prompt(cutoff)?,
            self.settings.verification,
            tools,
        );

        let status = loop {
            let next = verifier.next(&options).await?;
            if should_continue(&next.messages) {
                continue;
            }
            if let Some(status) = detect_terminal(
                verifier.state.status(),
                &VERIFICATION_STATUSES,
                verifier.state.iter,
                self.settings.task_max_iters,
            ) {
                break status;
            }
        };
        info!(agent = %verifier.name(), "Verification finished with status {}", status);

        let messages = std::mem::take(&mut verifier.state.ctx.messages);
        verifier.state.ctx.messages = remove_tool_calls(messages, &["incorrect", "correct"]);

        self.emit_job(Some("done".into()));

        Ok(Verification {
            correct: status == SentinelStatus::Correct,
            text: verifier.state.results().map(str::to_string),
        })
    }
}
