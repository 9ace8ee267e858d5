use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{SearchKind, SearchProvider};
use crate::agent::{AgentTool, ToolContext, ToolHandler};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolArgument};

pub const DOWNLOADS_DIR: &str = "/mnt/data/downloads";

pub fn download() -> AgentTool {
    AgentTool::new(
        Tool::new("download")
            .with_description("Downloads the given URL")
            .with_argument(ToolArgument::string("url").required()),
        DownloadTool,
    )
}

pub fn goto_url() -> AgentTool {
    AgentTool::new(
        Tool::new("browser_goto_url")
            .with_description("Opens the given URL in the browser.")
            .with_argument(ToolArgument::string("url").required()),
        GotoTool,
    )
}

pub fn get_text() -> AgentTool {
    AgentTool::new(
        Tool::new("browser_get_text").with_description("Returns text from loaded page"),
        GetTextTool,
    )
}

pub fn get_links() -> AgentTool {
    AgentTool::new(
        Tool::new("browser_get_links").with_description("Returns all links from loaded page"),
        GetLinksTool,
    )
}

pub fn eval_js() -> AgentTool {
    AgentTool::new(
        Tool::new("browser_eval_js")
            .with_description("Evaluates JavaScript code on loaded page")
            .with_argument(
                ToolArgument::string("js")
                    .required()
                    .with_description("Tip: puppeteer's page.evaluate()"),
            ),
        EvalJsTool,
    )
}

pub fn search(kind: SearchKind, provider: Arc<dyn SearchProvider>) -> AgentTool {
    let (id, description) = match kind {
        SearchKind::Web => ("web_search", "Searches the web for the given query."),
        SearchKind::News => ("news_search", "Searches news for the given query"),
        SearchKind::Image => ("image_search", "Searches images for the given query"),
    };
    AgentTool::new(
        Tool::new(id)
            .with_description(description)
            .with_argument(ToolArgument::string("query").required())
            .with_argument(ToolArgument::number("page")),
        SearchTool { kind, provider },
    )
}

struct DownloadTool;

#[async_trait]
impl ToolHandler for DownloadTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let url = ctx.str_arg("url")?.to_string();
        let saved = ctx.sandbox.download_url(&url, DOWNLOADS_DIR).await?;
        ctx.out.json(saved);
        Ok(())
    }
}

struct GotoTool;

#[async_trait]
impl ToolHandler for GotoTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let mut url = ctx.str_arg("url")?.to_string();
        if !url.starts_with("http") {
            url = format!("http://{}", url);
        }
        let page = ctx.sandbox.goto(&url).await?;
        ctx.out.json(json!(page));
        Ok(())
    }
}

struct GetTextTool;

#[async_trait]
impl ToolHandler for GetTextTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let text = ctx.sandbox.page_text().await?;
        ctx.out.any(text);
        Ok(())
    }
}

struct GetLinksTool;

#[async_trait]
impl ToolHandler for GetLinksTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let links = ctx.sandbox.page_links().await?;
        ctx.out.json(json!(links));
        Ok(())
    }
}

struct EvalJsTool;

#[async_trait]
impl ToolHandler for EvalJsTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let js = ctx.str_arg("js")?.to_string();
        let result = ctx.sandbox.eval_js(&js).await?;
        ctx.out.any(result);
        Ok(())
    }
}

struct SearchTool {
    kind: SearchKind,
    provider: Arc<dyn SearchProvider>,
}

#[async_trait]
impl ToolHandler for SearchTool {
    async fn call(&self, ctx: &mut ToolContext<'_>) -> AgentResult<()> {
        let query = ctx.str_arg("query")?.to_string();
        let page = match ctx.args.get("page") {
            None => 0,
            Some(value) => value.as_u64().ok_or_else(|| AgentError::InvalidArgument {
                name: "page".into(),
                expected: "non-negative integer".into(),
            })?,
        };

        let items = self.provider.search(self.kind, &query, page).await?;
        ctx.out.json(json!({
            "query": query,
            "page": page,
            "nextPage": page + 1,
            "items": items,
        }));
        Ok(())
    }
}
