use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::providers::base::{GenerateRequest, Provider};
use crate::sandbox::{CommandOutput, Sandbox};
use crate::token_counter::Tokenizer;

/// One token per character, which keeps budgets easy to reason about in tests
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .map(|t| char::from_u32(*t).ok_or_else(|| anyhow!("invalid token {}", t)))
            .collect()
    }
}

/// What the mock provider was asked to do
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: Vec<String>,
}

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Mutex<Vec<Message>>,
    requests: Mutex<Vec<RecordedRequest>>,
    context_size: Option<usize>,
    fail_when_exhausted: bool,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            context_size: Some(4096),
            fail_when_exhausted: false,
        }
    }

    pub fn with_context_size(mut self, context_size: Option<usize>) -> Self {
        self.context_size = context_size;
        self
    }

    /// Return a transport error instead of an empty reply once the script runs out
    pub fn failing_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn tokenizer(&self) -> &dyn Tokenizer {
        &CharTokenizer
    }

    fn context_size(&self) -> Option<usize> {
        self.context_size
    }

    fn knowledge_cutoff(&self) -> Option<DateTime<Utc>> {
        None
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Vec<Message>> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.iter().map(|t| t.id.clone()).collect(),
        });
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            if self.fail_when_exhausted {
                bail!("connection closed");
            }
            // Return empty response if no more pre-configured responses
            Ok(vec![Message::assistant().with_text("")])
        } else {
            Ok(vec![responses.remove(0)])
        }
    }
}

/// In-memory sandbox that records commands and files
#[derive(Default)]
pub struct MockSandbox {
    pub commands: Mutex<Vec<String>>,
    pub files: Mutex<HashMap<String, String>>,
    outputs: Mutex<HashMap<String, CommandOutput>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the output of one command. Unknown commands echo themselves with exit code 0.
    pub fn with_output(self, command: &str, output: CommandOutput) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(command.to_string(), output);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        let scripted = self.outputs.lock().unwrap().get(command).cloned();
        Ok(scripted.unwrap_or_else(|| CommandOutput::new(command, 0)))
    }

    async fn write_file(&self, path: &str, text: &str) -> Result<CommandOutput> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
        Ok(CommandOutput::new("", 0))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }
}
