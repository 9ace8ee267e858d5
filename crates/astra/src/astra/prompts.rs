use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::agent::SentinelStatus;
use crate::prompt_template::render_prompt;

const DATE_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

pub fn format_knowledge_cutoff(cutoff: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let current = format!("Current date: {}", now.format(DATE_FORMAT));
    match cutoff {
        Some(cutoff) => format!(
            "You have knowledge cut off at {}\n{}",
            cutoff.format(DATE_FORMAT),
            current
        ),
        None => current,
    }
}

pub fn main_system_prompt(cutoff: Option<DateTime<Utc>>) -> Result<String> {
    let knowledge_cutoff = format_knowledge_cutoff(cutoff, Utc::now());
    Ok(render_prompt(
        "main_system.md",
        &json!({ "knowledge_cutoff": knowledge_cutoff }),
    )?)
}

pub fn worker_system_prompt(cutoff: Option<DateTime<Utc>>) -> Result<String> {
    let knowledge_cutoff = format_knowledge_cutoff(cutoff, Utc::now());
    Ok(render_prompt(
        "worker_system.md",
        &json!({ "knowledge_cutoff": knowledge_cutoff }),
    )?)
}

/// Closing request to the summary engine. `status` is one of done, failed or timeout.
pub fn summary_prompt(status: SentinelStatus, task: &str) -> Result<String> {
    let prompt = render_prompt(
        "summary.md",
        &json!({ "status": status.to_string(), "task": task }),
    )?;
    Ok(prompt.trim().to_string())
}

pub fn verification_prompt(task: &str, results: &str) -> Result<String> {
    let prompt = render_prompt(
        "verification.md",
        &json!({ "task": task, "results": results }),
    )?;
    Ok(prompt.trim().to_string())
}
