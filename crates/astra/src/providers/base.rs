use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::token_counter::Tokenizer;

/// Context size assumed when the provider does not report one
pub const DEFAULT_CONTEXT_SIZE: usize = 4096;

/// Everything a provider needs to produce the next message(s)
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    /// The already truncated context, starting with the system message
    pub messages: &'a [Message],
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: &'a [Tool],
}

/// Base trait for language model providers (OpenAI, Anthropic, etc)
///
/// Transport concerns such as retries and rate limiting belong to the
/// implementation; errors returned here reach the caller of the orchestrator.
#[async_trait]
pub trait Provider: Send + Sync {
    fn tokenizer(&self) -> &dyn Tokenizer;

    fn context_size(&self) -> Option<usize>;

    fn knowledge_cutoff(&self) -> Option<DateTime<Utc>>;

    /// Generate the next message(s) for the given context
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Vec<Message>>;
}
