//! Conversation message types.
//!
//! The message log is the heart of the turn state: an append-only sequence of
//! tagged variants. The LLM contract requires every Assistant message that
//! carries tool calls to be immediately followed by Tool messages covering
//! its call ids, so the variants are distinguished at the type level rather
//! than by a free-form role string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    pub call_id: String,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    /// User speech (transcribed) or typed text.
    Human { text: String },

    /// Model output, optionally carrying tool calls.
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },

    /// Result of a tool call, paired by `call_id`.
    Tool {
        call_id: String,
        content: ToolContent,
    },

    /// Out-of-band notification the model should see on its next turn
    /// (e.g. background job completions, interruption notes).
    System { text: String },
}

/// Tool result content: plain text or multimodal parts (screen frames).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image {
        /// Base64-encoded image payload.
        data: String,
        media_type: String,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl ChatMessage {
    pub fn human(text: impl Into<String>) -> Self {
        Self::Human { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls,
        }
    }

    pub fn tool(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            content: ToolContent::Text(text.into()),
        }
    }

    pub fn tool_parts(call_id: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            content: ToolContent::Parts(parts),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    /// Plain text of the message, if it has any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Human { text } | Self::Assistant { text, .. } | Self::System { text } => {
                Some(text.as_str())
            }
            Self::Tool { content, .. } => match content {
                ToolContent::Text(t) => Some(t.as_str()),
                ToolContent::Parts(parts) => parts.iter().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                }),
            },
        }
    }

    /// Tool call ids carried by an Assistant message (empty otherwise).
    pub fn tool_call_ids(&self) -> Vec<&str> {
        match self {
            Self::Assistant { tool_calls, .. } => {
                tool_calls.iter().map(|tc| tc.call_id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }

    /// Rough payload size used by the char/4 token estimate.
    pub fn approx_chars(&self) -> usize {
        match self {
            Self::Human { text } | Self::Assistant { text, .. } | Self::System { text } => {
                text.len()
            }
            Self::Tool { content, .. } => match content {
                ToolContent::Text(t) => t.len(),
                ToolContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => text.len(),
                        ContentPart::Image { data, .. } => data.len(),
                    })
                    .sum(),
            },
        }
    }
}
