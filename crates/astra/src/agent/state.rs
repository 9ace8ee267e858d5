use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

use crate::models::message::Message;

const ITER_KEY: &str = "iter";
const STATUS_KEY: &str = "status";
const RESULTS_KEY: &str = "results";

/// Terminal markers written by sentinel tools or synthesized by a loop
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SentinelStatus {
    Done,
    Failed,
    Timeout,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub messages: Vec<Message>,
}

/// Conversation state of one engine.
///
/// Serializes as `{ctx: {messages}, data: [[key, value], ...]}` where the known
/// keys `iter`, `status` and `results` share the entry list with free-form data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StateSnapshot", into = "StateSnapshot")]
pub struct AgentState {
    pub ctx: AgentContext,
    pub iter: u32,
    status: Option<SentinelStatus>,
    results: Option<String>,
    data: BTreeMap<String, Value>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.ctx.messages
    }

    pub fn add_message(&mut self, message: Message) {
        self.ctx.messages.push(message);
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.ctx.messages.extend(messages);
    }

    pub fn status(&self) -> Option<SentinelStatus> {
        self.status
    }

    pub fn set_status(&mut self, status: SentinelStatus) -> &mut Self {
        self.status = Some(status);
        // a restored unknown status is superseded
        self.data.remove(STATUS_KEY);
        self
    }

    pub fn results(&self) -> Option<&str> {
        self.results.as_deref()
    }

    pub fn set_results<S: Into<String>>(&mut self, results: S) -> &mut Self {
        self.results = Some(results.into());
        self
    }

    /// Forget the outcome of a previous task
    pub fn clear_outcome(&mut self) {
        self.status = None;
        self.results = None;
    }

    /// Store tool specific data under `key`.
    ///
    /// `iter`, `status` and `results` belong to the typed fields and are ignored here.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> serde_json::Result<&mut Self> {
        if matches!(key, ITER_KEY | STATUS_KEY | RESULTS_KEY) {
            warn!("Ignoring data for reserved state key {:?}", key);
            return Ok(self);
        }
        self.data.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_json(json: Value) -> serde_json::Result<Self> {
        serde_json::from_value(json)
    }
}

#[derive(Serialize, Deserialize)]
struct StateSnapshot {
    #[serde(default)]
    ctx: AgentContext,
    #[serde(default)]
    data: Vec<(String, Value)>,
}

impl From<AgentState> for StateSnapshot {
    fn from(state: AgentState) -> Self {
        let mut data = vec![(ITER_KEY.to_string(), Value::from(state.iter))];
        if let Some(status) = state.status {
            data.push((STATUS_KEY.to_string(), Value::String(status.to_string())));
        }
        if let Some(results) = state.results {
            data.push((RESULTS_KEY.to_string(), Value::String(results)));
        }
        data.extend(state.data);
        StateSnapshot {
            ctx: state.ctx,
            data,
        }
    }
}

impl From<StateSnapshot> for AgentState {
    fn from(snapshot: StateSnapshot) -> Self {
        let mut state = AgentState {
            ctx: snapshot.ctx,
            ..Default::default()
        };
        for (key, value) in snapshot.data {
            match (key.as_str(), &value) {
                (ITER_KEY, Value::Number(n)) => {
                    state.iter = n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0);
                }
                (STATUS_KEY, Value::String(raw)) => match SentinelStatus::from_str(raw) {
                    Ok(status) => state.status = Some(status),
                    Err(_) => {
                        warn!("Unknown status {:?} kept as plain data", raw);
                        state.data.insert(key, value);
                    }
                },
                (RESULTS_KEY, Value::String(results)) => state.results = Some(results.clone()),
                _ => {
                    state.data.insert(key, value);
                }
            }
        }
        state
    }
}
