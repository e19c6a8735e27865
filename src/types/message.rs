//! Conversation turn and content block types.

use serde::{Deserialize, Serialize};

/// Conversation role. Tool results travel inside user turns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged unit of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: Content,
}

/// Turn content: plain text or an ordered list of blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<Block>),
}

/// A single typed unit of turn content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { text: String },
    Image(ImageContent),
    ToolUse(ToolCall),
    ToolResult(ToolResultBlock),
    Thinking { thinking: String },
}

/// Image payload reference embedded in a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub media_type: String,
    pub data: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

/// The result of a tool invocation, paired to a `ToolCall` by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl Turn {
    /// Create a plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// Create a plain-text assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }

    /// Create a turn from explicit blocks.
    pub fn with_blocks(role: Role, blocks: Vec<Block>) -> Self {
        Self {
            role,
            content: Content::Blocks(blocks),
        }
    }

    /// Create a user turn holding tool results.
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self::with_blocks(
            Role::User,
            results.into_iter().map(Block::ToolResult).collect(),
        )
    }

    /// Concatenate the text content of this turn.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    Block::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Tool calls requested in this turn, in emission order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.blocks()
            .iter()
            .filter_map(|block| match block {
                Block::ToolUse(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Tool results carried by this turn.
    pub fn tool_results_iter(&self) -> impl Iterator<Item = &ToolResultBlock> {
        self.blocks().iter().filter_map(|block| match block {
            Block::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// Borrow the block list (empty for plain-text content).
    pub fn blocks(&self) -> &[Block] {
        match &self.content {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }

    /// Number of blocks, counting plain text as one.
    pub fn block_count(&self) -> usize {
        match &self.content {
            Content::Text(_) => 1,
            Content::Blocks(blocks) => blocks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.content {
            Content::Text(text) => text.is_empty(),
            Content::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<Vec<Block>> for Content {
    fn from(blocks: Vec<Block>) -> Self {
        Content::Blocks(blocks)
    }
}

impl Content {
    /// Whether there is nothing worth sending to the model.
    pub fn is_blank(&self) -> bool {
        match self {
            Content::Text(text) => text.trim().is_empty(),
            Content::Blocks(blocks) => blocks.iter().all(|block| match block {
                Block::Text { text } => text.trim().is_empty(),
                Block::Thinking { .. } => true,
                _ => false,
            }),
        }
    }

    /// Convert into an owned block list.
    pub fn into_blocks(self) -> Vec<Block> {
        match self {
            Content::Text(text) if text.is_empty() => Vec::new(),
            Content::Text(text) => vec![Block::Text { text }],
            Content::Blocks(blocks) => blocks,
        }
    }
}
