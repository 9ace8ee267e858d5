//! The delegation orchestrator.
//!
//! [`AstraAgent`] owns four engines sharing one provider and one sandbox. The
//! main engine talks to the user and hands bounded sub-tasks to the worker
//! engine through the `delegate_task` tool. A finished worker run is condensed
//! by the summary engine, and results can optionally be checked by the
//! verification engine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::agent::{
    Agent, AgentNext, AgentNextOptions, AgentObserver, AgentState, AgentTool, ToolCallEvent,
};
use crate::providers::base::Provider;
use crate::sandbox::Sandbox;
use crate::settings::Settings;
use crate::toolkit::Toolkit;

pub mod delegation;
pub mod prompts;
pub mod verification;

use delegation::{delegate_task, Delegator};
pub use delegation::{detect_terminal, should_continue, DelegationPhase};
pub use verification::Verification;

const EVENT_CAPACITY: usize = 256;
const STATE_FILE: &str = "state.json";

/// Progress notifications for whoever presents the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AstraEvent {
    /// A task was handed to the worker
    Task { task: Option<String> },
    /// What the engines are busy with. `None` resets the indicator.
    Job { job: Option<String> },
}

#[derive(Clone, Default)]
pub struct AstraAgentOptions {
    pub settings: Settings,
    /// Extra tools for the main engine, offered next to `delegate_task`
    pub main_agent_tools: Vec<AgentTool>,
}

impl AstraAgentOptions {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            main_agent_tools: Vec::new(),
        }
    }

    pub fn with_main_tool(mut self, tool: AgentTool) -> Self {
        self.main_agent_tools.push(tool);
        self
    }
}

impl From<Settings> for AstraAgentOptions {
    fn from(settings: Settings) -> Self {
        Self::new(settings)
    }
}

/// Persisted form of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstraAgentState {
    pub main_agent: AgentState,
    pub worker_agent: AgentState,
}

/// Turns every tool call of an engine into a job event
struct JobForwarder {
    events: broadcast::Sender<AstraEvent>,
}

#[async_trait]
impl AgentObserver for JobForwarder {
    async fn on_tool_call(&self, event: &ToolCallEvent) {
        let _ = self.events.send(AstraEvent::Job {
            job: Some(event.tool.id.clone()),
        });
    }
}

pub struct AstraAgent {
    options: AstraAgentOptions,
    main: Agent,
    delegator: Arc<Delegator>,
    events: broadcast::Sender<AstraEvent>,
}

impl AstraAgent {
    pub fn new(
        options: AstraAgentOptions,
        sandbox: Arc<dyn Sandbox>,
        toolkit: Toolkit,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let forwarder: Arc<dyn AgentObserver> = Arc::new(JobForwarder {
            events: events.clone(),
        });

        let engine = |name: &str| {
            let mut agent = Agent::new(name, provider.clone(), sandbox.clone())
                .with_default_context_size(options.settings.default_context_size);
            agent.subscribe(forwarder.clone());
            agent
        };
        let main = engine("main");
        let delegator = Delegator::new(
            engine("worker"),
            engine("summary"),
            engine("verification"),
            toolkit,
            options.settings.clone(),
            events.clone(),
        );

        Self {
            options,
            main,
            delegator: Arc::new(delegator),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AstraEvent> {
        self.events.subscribe()
    }

    /// Register a lifecycle observer on the main engine
    pub fn observe(&mut self, observer: Arc<dyn AgentObserver>) {
        self.main.subscribe(observer);
    }

    pub fn main_agent(&self) -> &Agent {
        &self.main
    }

    /// Mutable access to the main engine, e.g. to append user messages
    pub fn main_agent_mut(&mut self) -> &mut Agent {
        &mut self.main
    }

    pub fn main_tools(&self) -> Vec<AgentTool> {
        let mut tools = self.options.main_agent_tools.clone();
        tools.push(delegate_task(self.delegator.clone()));
        tools
    }

    /// One main engine turn. A `delegate_task` call runs the whole nested
    /// worker loop before this returns.
    pub async fn next(&mut self) -> Result<AgentNext> {
        let generation = self.options.settings.main;
        let options = AgentNextOptions {
            system_prompt: prompts::main_system_prompt(self.main.provider().knowledge_cutoff())?,
            max_tokens: Some(generation.max_tokens),
            temperature: Some(generation.temperature),
            tools: self.main_tools(),
            only_one_user_message: false,
        };
        self.main.next(&options).await
    }

    /// Ask the verification engine whether `results` fulfil `task`
    pub async fn verify(&self, task: &str, results: &str) -> Result<Verification> {
        self.delegator.verify(task, results).await
    }

    pub async fn worker_state(&self) -> AgentState {
        self.delegator.worker.lock().await.state.clone()
    }

    pub async fn summary_state(&self) -> AgentState {
        self.delegator.summary.lock().await.state.clone()
    }

    pub async fn state(&self) -> AstraAgentState {
        AstraAgentState {
            main_agent: self.main.state.clone(),
            worker_agent: self.worker_state().await,
        }
    }

    /// Write the main and worker states to `<dir>/state.json`
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(STATE_FILE);
        let json = serde_json::to_string_pretty(&self.state().await)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Restore the states written by [`save`](Self::save). A missing file is not an error.
    pub async fn load(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let path = dir.as_ref().join(STATE_FILE);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("No saved state at {}", path.display());
            return Ok(());
        }
        let json = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let state: AstraAgentState = serde_json::from_str(&json)
            .with_context(|| format!("Malformed state in {}", path.display()))?;

        self.main.with_state(state.main_agent);
        self.delegator
            .worker
            .lock()
            .await
            .with_state(state.worker_agent);
        Ok(())
    }

    pub async fn stop_immediately(&self) {
        self.main.stop_immediately().await;
    }
}
