//! Conversation message types.
//!
//! The engine speaks one canonical message shape throughout: a role plus a
//! list of content blocks (text, tool invocations, tool results). Provider
//! drivers translate between this shape and their vendor wire formats; the
//! rest of the system treats messages as opaque records except when pairing
//! `tool_use` blocks with their `tool_result`s.

use serde::{Deserialize, Serialize};

/// The role of a message in a tool-loop conversation.
///
/// Tool results travel inside `User` messages, mirroring the Anthropic
/// Messages API. System prompts are a separate request field, not a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// A single message in a tool-loop conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageParam {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl MessageParam {
    /// Create a user message holding plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create an assistant message holding plain text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Create an assistant message from arbitrary blocks.
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Create a user message carrying tool results.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }

    /// Concatenated text of all `Text` blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// All `tool_use` blocks as `(id, name, input)` triples.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// IDs referenced by `tool_result` blocks in this message.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether this message requests any tool calls.
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// Check the tool-use/result pairing invariant over a transcript: every
/// `tool_use{id}` must be answered by a `tool_result{tool_use_id}` before the
/// next assistant message, and the counts must balance.
pub fn transcript_is_paired(messages: &[MessageParam]) -> bool {
    let mut open: Vec<String> = Vec::new();
    let mut uses = 0usize;
    let mut results = 0usize;

    for msg in messages {
        match msg.role {
            Role::Assistant => {
                if !open.is_empty() {
                    return false;
                }
                for (id, _, _) in msg.tool_uses() {
                    open.push(id.to_string());
                    uses += 1;
                }
            }
            Role::User => {
                for id in msg.tool_result_ids() {
                    results += 1;
                    match open.iter().position(|o| o == id) {
                        Some(pos) => {
                            open.remove(pos);
                        }
                        None => return false,
                    }
                }
            }
        }
    }

    open.is_empty() && uses == results
}
