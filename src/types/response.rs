//! Structured model responses.

use super::generation::StopReason;
use super::message::{Block, Role, ToolCall, Turn};
use super::usage::Usage;

/// A complete model response for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// Content blocks in emission order.
    pub content: Vec<Block>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

impl ModelResponse {
    /// A plain text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Block::Text { text: text.into() }],
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage::default(),
        }
    }

    /// Tool-use requests in emission order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                Block::ToolUse(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Whether the model asked for tools (the round is not final).
    pub fn requests_tools(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, Block::ToolUse(_)))
    }

    /// Concatenated answer text.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The assistant turn recording this response verbatim.
    pub fn to_turn(&self) -> Turn {
        Turn::with_blocks(Role::Assistant, self.content.clone())
    }
}
