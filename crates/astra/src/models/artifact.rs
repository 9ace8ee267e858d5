use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextArtifact {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonArtifact {
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArtifact {
    #[serde(with = "base64_bytes")]
    pub buffer: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub stdout: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// Typed output of a tool invocation
pub enum Artifact {
    Text(TextArtifact),
    Json(JsonArtifact),
    Image(ImageArtifact),
    Command(CommandArtifact),
}

impl Artifact {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Artifact::Text(TextArtifact { data: text.into() })
    }

    pub fn json(data: Value) -> Self {
        Artifact::Json(JsonArtifact { data })
    }

    pub fn image(buffer: Vec<u8>, description: Option<String>) -> Self {
        Artifact::Image(ImageArtifact {
            buffer,
            description,
        })
    }

    pub fn command<S: Into<String>>(command: Option<String>, stdout: S, exit_code: i32) -> Self {
        Artifact::Command(CommandArtifact {
            command,
            stdout: stdout.into(),
            exit_code,
        })
    }

    /// Render the artifact the way the model gets to see it
    pub fn to_text(&self) -> String {
        match self {
            Artifact::Image(image) => match &image.description {
                Some(description) => format!("[image - {}]", description),
                None => "[image]".to_string(),
            },
            Artifact::Json(json) => {
                serde_json::to_string_pretty(&json.data).unwrap_or_else(|_| json.data.to_string())
            }
            Artifact::Text(text) => text.data.clone(),
            Artifact::Command(command) => {
                format!("Exit code: {}\n{}", command.exit_code, command.stdout)
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Artifact::Text(text) => Some(&text.data),
            _ => None,
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
