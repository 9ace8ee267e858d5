use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a command run inside the sandbox
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn new<S: Into<String>>(stdout: S, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(exit_code),
        }
    }

    /// Exit code with a missing one read as success
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(0)
    }
}

/// What the browser reports after navigating somewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    pub text: String,
}

/// The Linux environment shared by every engine of one orchestrator.
///
/// Only one engine holds the active turn at a time, so implementations are not
/// expected to serialize concurrent callers themselves. Browser operations are
/// optional; the defaults report that no browser is attached.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run a non-interactive shell command
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    async fn write_file(&self, path: &str, text: &str) -> Result<CommandOutput>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Download `url` into the directory `dir`, describing what was saved
    async fn download_url(&self, url: &str, dir: &str) -> Result<Value> {
        let _ = (url, dir);
        bail!("Downloads are not supported by this sandbox")
    }

    async fn goto(&self, url: &str) -> Result<PageInfo> {
        let _ = url;
        bail!("No browser attached to this sandbox")
    }

    /// Visible text of the loaded page
    async fn page_text(&self) -> Result<Value> {
        bail!("No browser attached to this sandbox")
    }

    async fn page_links(&self) -> Result<Vec<PageLink>> {
        bail!("No browser attached to this sandbox")
    }

    async fn eval_js(&self, js: &str) -> Result<Value> {
        let _ = js;
        bail!("No browser attached to this sandbox")
    }
}
