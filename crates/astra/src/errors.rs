use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while resolving or running a tool call.
///
/// These never abort a turn: the engine renders them into the `error` field of
/// the resulting tool message so the model can react to them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument {name}: expected {expected}")]
    InvalidArgument { name: String, expected: String },

    #[error("{0}")]
    ExecutionError(String),

    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::ExecutionError(format!("{:#}", err))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
