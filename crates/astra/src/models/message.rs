use super::artifact::Artifact;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Arguments of a tool call, as the model produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolCallArgs {
    Structured(Map<String, Value>),
    Raw(String),
}

impl ToolCallArgs {
    /// Structured view of the arguments. Raw strings are exposed under the `args` key.
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            ToolCallArgs::Structured(map) => map.clone(),
            ToolCallArgs::Raw(raw) => {
                let mut map = Map::new();
                map.insert("args".to_string(), Value::String(raw.clone()));
                map
            }
        }
    }
}

impl From<Value> for ToolCallArgs {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => ToolCallArgs::Structured(map),
            Value::String(raw) => ToolCallArgs::Raw(raw),
            other => ToolCallArgs::Raw(other.to_string()),
        }
    }
}

/// One model-requested tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool: String,
    pub args: ToolCallArgs,
}

impl ToolCall {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, tool: T, args: impl Into<ToolCallArgs>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            args: args.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default = "now")]
    pub created: i64,
    /// Extension fields owned by external collaborators
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn now() -> i64 {
    Utc::now().timestamp()
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            artifacts: Vec::new(),
            error: None,
            created: now(),
            extra: Map::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Result of one tool call. Exactly one of these follows every requested call.
    pub fn tool_result<S: Into<String>>(
        tool_call_id: S,
        artifacts: Vec<Artifact>,
        error: Option<String>,
    ) -> Self {
        Message {
            tool_call_id: Some(tool_call_id.into()),
            artifacts,
            error,
            ..Self::new(Role::Tool)
        }
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = Some(text.into());
        self
    }

    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    pub fn with_extra<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Assistant message whose calls still wait for their tool results
    pub fn has_pending_tool_calls(&self) -> bool {
        self.role == Role::Assistant && self.has_tool_calls()
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_args_are_wrapped() {
        let call = ToolCall::new("1", "exec", json!("ls -la"));
        assert_eq!(call.args.to_map(), json!({"args": "ls -la"}).as_object().unwrap().clone());
    }

    #[test]
    fn test_wire_shape() {
        let message = Message::assistant()
            .with_tool_call(ToolCall::new("c1", "done", json!({})))
            .with_extra("source", json!("telegram"));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["toolCalls"][0]["tool"], "done");
        assert_eq!(value["source"], "telegram");
        assert!(value.get("toolCallId").is_none());

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_missing_created_is_filled() {
        let message: Message = serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert_eq!(message.text(), "hi");
        assert!(message.created > 0);
        assert!(message.extra.is_empty());
    }

    #[test]
    fn test_pending_tool_calls() {
        let call = ToolCall::new("1", "exec", json!({}));
        assert!(Message::assistant().with_tool_call(call.clone()).has_pending_tool_calls());
        assert!(!Message::assistant().with_text("hi").has_pending_tool_calls());
        assert!(!Message::user().with_tool_call(call).has_pending_tool_calls());
    }
}
