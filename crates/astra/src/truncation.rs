use anyhow::Result;
use std::collections::HashSet;

use crate::models::message::{Message, Role};
use crate::token_counter::Tokenizer;

/// Keep the newest messages that fit into `max_context_size - stride` tokens.
///
/// The scan runs newest to oldest and stops at the first message that would
/// overflow the budget. The window is then cleaned up so it never starts with a
/// tool result whose call was cut off, and never ends with an assistant call
/// that is still waiting for its results.
pub fn truncate_message_history(
    messages: Vec<Message>,
    tokenizer: &dyn Tokenizer,
    max_context_size: usize,
    stride: usize,
) -> Result<Vec<Message>> {
    let mut used = 0;
    let mut keep_from = messages.len();

    for (i, message) in messages.iter().enumerate().rev() {
        let tokens = tokenizer.count_tokens(message.text())?;
        if used + tokens + stride > max_context_size {
            break;
        }
        used += tokens;
        keep_from = i;
    }

    let mut window: Vec<Message> = messages.into_iter().skip(keep_from).collect();

    let dangling = window
        .iter()
        .take_while(|message| message.role == Role::Tool)
        .count();
    window.drain(..dangling);

    if window.last().is_some_and(|last| last.has_pending_tool_calls()) {
        window.pop();
    }

    Ok(window)
}

/// Remove every call to one of `tools` together with its tool result.
///
/// An assistant message left without calls is dropped entirely.
pub fn remove_tool_calls(messages: Vec<Message>, tools: &[&str]) -> Vec<Message> {
    let mut removed_ids = HashSet::new();
    let mut kept = Vec::with_capacity(messages.len());

    for mut message in messages {
        match message.role {
            Role::Assistant if message.has_tool_calls() => {
                message.tool_calls.retain(|call| {
                    if tools.contains(&call.tool.as_str()) {
                        removed_ids.insert(call.id.clone());
                        false
                    } else {
                        true
                    }
                });
                if message.tool_calls.is_empty() {
                    continue;
                }
            }
            Role::Tool => {
                if let Some(id) = &message.tool_call_id {
                    if removed_ids.contains(id) {
                        continue;
                    }
                }
            }
            _ => {}
        }
        kept.push(message);
    }

    kept
}

pub fn has_any_tool_call(messages: &[Message]) -> bool {
    messages.iter().any(Message::has_tool_calls)
}
