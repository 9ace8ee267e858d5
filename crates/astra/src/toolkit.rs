//! Tools the worker and verification engines get to use.
//!
//! Every tool is a thin adapter over the shared [`Sandbox`](crate::sandbox::Sandbox)
//! or an optional [`SearchProvider`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::agent::AgentTool;

pub mod browser;
pub mod sandbox;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SearchKind {
    Web,
    News,
    Image,
}

/// External search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// One page of results, zero based
    async fn search(&self, kind: SearchKind, query: &str, page: u64) -> Result<Vec<Value>>;
}

/// Assembles the tool sets of the delegated engines
#[derive(Clone, Default)]
pub struct Toolkit {
    search: Option<Arc<dyn SearchProvider>>,
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn worker_tools(&self) -> Vec<AgentTool> {
        let mut tools = vec![
            sandbox::save_file(),
            sandbox::exec(),
            sandbox::python(),
            browser::download(),
        ];
        if let Some(search) = &self.search {
            for kind in [SearchKind::Web, SearchKind::News, SearchKind::Image] {
                tools.push(browser::search(kind, search.clone()));
            }
        }
        tools.extend([
            browser::goto_url(),
            browser::get_text(),
            browser::get_links(),
            browser::eval_js(),
        ]);
        tools
    }

    pub fn verification_tools(&self) -> Vec<AgentTool> {
        vec![sandbox::exec(), sandbox::python()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoResults;

    #[async_trait]
    impl SearchProvider for NoResults {
        async fn search(&self, _kind: SearchKind, _query: &str, _page: u64) -> Result<Vec<Value>> {
            Ok(vec![])
        }
    }

    fn ids(tools: &[AgentTool]) -> Vec<&str> {
        tools.iter().map(AgentTool::id).collect()
    }

    #[test]
    fn test_worker_tools_without_search() {
        let toolkit = Toolkit::new();
        assert_eq!(
            ids(&toolkit.worker_tools()),
            vec![
                "save_file",
                "exec",
                "python",
                "download",
                "browser_goto_url",
                "browser_get_text",
                "browser_get_links",
                "browser_eval_js"
            ]
        );
    }

    #[test]
    fn test_worker_tools_with_search() {
        let toolkit = Toolkit::new().with_search(Arc::new(NoResults));
        let tools = toolkit.worker_tools();
        assert_eq!(
            ids(&tools)[4..7],
            ["web_search", "news_search", "image_search"]
        );
    }

    #[test]
    fn test_verification_tools() {
        assert_eq!(ids(&Toolkit::new().verification_tools()), vec!["exec", "python"]);
    }
}
