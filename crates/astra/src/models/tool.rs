use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Debug;

use crate::errors::{AgentError, AgentResult};

/// Declared type of a tool argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Number,
    Boolean,
    Object,
}

impl ArgumentKind {
    /// Check a value against this kind, coercing the lossless string spellings
    /// models like to emit for numbers and booleans.
    ///
    /// Strings are loose: lists and objects pass through as sent, scalars
    /// become their text.
    fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (
                ArgumentKind::String,
                value @ (Value::String(_) | Value::Array(_) | Value::Object(_)),
            ) => Some(value),
            (ArgumentKind::String, value @ (Value::Number(_) | Value::Bool(_))) => {
                Some(Value::String(value.to_string()))
            }
            (ArgumentKind::Number, value @ Value::Number(_)) => Some(value),
            (ArgumentKind::Number, Value::String(raw)) => {
                let raw = raw.trim();
                if let Ok(int) = raw.parse::<i64>() {
                    Some(json!(int))
                } else {
                    raw.parse::<f64>().ok().and_then(|float| {
                        serde_json::Number::from_f64(float).map(Value::Number)
                    })
                }
            }
            (ArgumentKind::Boolean, value @ Value::Bool(_)) => Some(value),
            (ArgumentKind::Boolean, Value::String(raw)) => match raw.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ArgumentKind::Object, value @ (Value::Object(_) | Value::Array(_))) => Some(value),
            _ => None,
        }
    }
}

/// A single named argument in a tool's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArgumentKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolArgument {
    pub fn new<S: Into<String>>(name: S, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn string<S: Into<String>>(name: S) -> Self {
        Self::new(name, ArgumentKind::String)
    }

    pub fn number<S: Into<String>>(name: S) -> Self {
        Self::new(name, ArgumentKind::Number)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate the value supplied for this argument.
    ///
    /// Returns the value to hand to the tool: the (coerced) supplied value, the
    /// default for an absent optional argument, or `None` when neither exists.
    /// `null` counts as absent.
    pub fn validate(&self, value: Option<Value>) -> AgentResult<Option<Value>> {
        match value.filter(|v| !v.is_null()) {
            Some(value) => self
                .kind
                .coerce(value)
                .map(Some)
                .ok_or_else(|| AgentError::InvalidArgument {
                    name: self.name.clone(),
                    expected: self.kind.to_string(),
                }),
            None if self.required => Err(AgentError::MissingArgument(self.name.clone())),
            None => Ok(self.default.clone()),
        }
    }
}

/// Describes a tool to the model. The implementation lives in [`crate::agent::AgentTool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<ToolArgument>,
}

impl Tool {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Tool {
            id: id.into(),
            description: None,
            arguments: Vec::new(),
        }
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_argument(mut self, argument: ToolArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// One line summary, e.g. `exec(command: string) - Executes a command`
    pub fn signature(&self) -> String {
        let args = self
            .arguments
            .iter()
            .map(|arg| {
                let mut sig = format!(
                    "{}: {}{}",
                    arg.name,
                    arg.kind,
                    if arg.required { "" } else { "?" }
                );
                if let Some(default) = &arg.default {
                    sig.push_str(&format!(" = {}", default));
                }
                sig
            })
            .collect::<Vec<_>>()
            .join(", ");
        match &self.description {
            Some(description) => format!("{}({}) - {}", self.id, args, description),
            None => format!("{}({})", self.id, args),
        }
    }

    /// JSON schema of the arguments, for transports that speak function calling
    pub fn parameters(&self) -> Value {
        let mut properties = Map::new();
        for arg in &self.arguments {
            let mut property = Map::new();
            property.insert("type".into(), json!(arg.kind));
            if let Some(description) = &arg.description {
                property.insert("description".into(), json!(description));
            }
            if let Some(default) = &arg.default {
                property.insert("default".into(), default.clone());
            }
            properties.insert(arg.name.clone(), Value::Object(property));
        }
        let required: Vec<&str> = self
            .arguments
            .iter()
            .filter(|arg| arg.required)
            .map(|arg| arg.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate raw call arguments against the schema and fill in defaults.
    /// Keys the schema does not declare are passed through untouched.
    pub fn parse_arguments(&self, mut args: Map<String, Value>) -> AgentResult<Map<String, Value>> {
        for arg in &self.arguments {
            match arg.validate(args.remove(&arg.name))? {
                Some(value) => {
                    args.insert(arg.name.clone(), value);
                }
                None => {
                    args.remove(&arg.name);
                }
            }
        }
        Ok(args)
    }
}
