//! History sanitization.
//!
//! [`sanitize`] restores the invariants the provider API requires of a
//! conversation:
//!
//! - history starts with a user turn;
//! - assistant turns never carry `thinking` blocks;
//! - every `tool_use` has exactly one matching `tool_result` in the
//!   immediately following user turn, and every `tool_result` answers a
//!   `tool_use` in the immediately preceding assistant turn;
//! - no text or tool-result payload exceeds the configured ceiling;
//! - only the most recent turns keep their images;
//! - at most `max_history_turns` turns are kept, starting at a user message.
//!
//! The function is pure and idempotent. Violations are repaired, never
//! reported.

pub mod normalize;

use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::types::{Block, Content, Role, ToolResultBlock, Turn};
use crate::util::truncate::cap_text;

/// Placeholder substituted for images outside the retention window.
pub const IMAGE_PLACEHOLDER: &str = "[image omitted from older history]";

/// Limits applied by [`sanitize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    pub max_block_chars: usize,
    pub image_retention_turns: usize,
    pub max_history_turns: usize,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SanitizeOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_block_chars: config.max_history_block_chars,
            image_retention_turns: config.image_retention_turns,
            max_history_turns: config.max_history_turns,
        }
    }
}

/// Produce an API-valid copy of `turns`.
pub fn sanitize(turns: &[Turn], options: &SanitizeOptions) -> Vec<Turn> {
    let mut current: Vec<Turn> = turns
        .iter()
        .cloned()
        .filter_map(canonicalize_turn)
        .collect();
    trim_to_recent(&mut current, options.max_history_turns);

    // Dropping a turn can expose a leading assistant turn or a new orphan,
    // so structural repair runs until nothing changes.
    loop {
        let mut next = current.clone();
        strip_leading_assistant(&mut next);
        let next = merge_adjacent_roles(pair_tool_results(next));
        if next == current {
            break;
        }
        current = next;
    }

    let keep_images_from = current.len().saturating_sub(options.image_retention_turns);
    current
        .into_iter()
        .enumerate()
        .map(|(idx, turn)| {
            let turn = if idx < keep_images_from {
                replace_images(turn)
            } else {
                turn
            };
            bound_sizes(turn, options.max_block_chars)
        })
        .collect()
}

/// Normalize raw JSON history and sanitize it.
pub fn sanitize_raw(values: &[serde_json::Value], options: &SanitizeOptions) -> Vec<Turn> {
    sanitize(&normalize::normalize_turns(values), options)
}

/// Remove blocks that can never be valid for the turn's role, plus thinking
/// and blank text. Returns `None` when nothing is left.
fn canonicalize_turn(turn: Turn) -> Option<Turn> {
    let role = turn.role;
    let content = match turn.content {
        Content::Text(text) if text.trim().is_empty() => return None,
        Content::Text(text) => Content::Text(text),
        Content::Blocks(blocks) => {
            let kept: Vec<Block> = blocks
                .into_iter()
                .filter(|block| match block {
                    Block::Thinking { .. } => false,
                    Block::Text { text } => !text.trim().is_empty(),
                    Block::ToolUse(_) => role == Role::Assistant,
                    Block::ToolResult(_) => role == Role::User,
                    Block::Image(_) => true,
                })
                .collect();
            if kept.is_empty() {
                return None;
            }
            Content::Blocks(kept)
        }
    };
    Some(Turn { role, content })
}

/// Drop the oldest turns beyond `max_turns`. The kept part starts at a user
/// message that is not only tool results; if the window holds none, it
/// starts at the last such message before the window instead.
fn trim_to_recent(turns: &mut Vec<Turn>, max_turns: usize) {
    if turns.len() <= max_turns {
        return;
    }
    let window_start = turns.len() - max_turns;
    let start = (window_start..turns.len())
        .find(|&idx| opens_exchange(&turns[idx]))
        .or_else(|| (0..window_start).rev().find(|&idx| opens_exchange(&turns[idx])))
        .unwrap_or(window_start);
    turns.drain(..start);
}

/// A user turn carrying something other than tool results.
fn opens_exchange(turn: &Turn) -> bool {
    turn.role == Role::User
        && match &turn.content {
            Content::Text(_) => true,
            Content::Blocks(blocks) => blocks
                .iter()
                .any(|block| !matches!(block, Block::ToolResult(_))),
        }
}

fn strip_leading_assistant(turns: &mut Vec<Turn>) {
    let leading = turns
        .iter()
        .take_while(|turn| turn.role == Role::Assistant)
        .count();
    turns.drain(..leading);
}

/// Keep each assistant turn only if all its tool calls are answered by the
/// next user turn; drop every tool result that does not answer the turn
/// directly before it.
fn pair_tool_results(turns: Vec<Turn>) -> Vec<Turn> {
    let mut out: Vec<Turn> = Vec::with_capacity(turns.len());
    let mut iter = turns.into_iter().peekable();

    while let Some(turn) = iter.next() {
        if turn.role == Role::User {
            if let Some(cleaned) = retain_results(turn, &HashSet::new()) {
                out.push(cleaned);
            }
            continue;
        }

        let call_ids: Vec<String> = turn.tool_calls().iter().map(|c| c.id.clone()).collect();
        if call_ids.is_empty() {
            out.push(turn);
            continue;
        }

        let open: HashSet<String> = call_ids.iter().cloned().collect();
        let unique_ids = open.len() == call_ids.len();
        let answered: HashSet<String> = match iter.peek() {
            Some(next) if next.role == Role::User => next
                .tool_results_iter()
                .map(|r| r.tool_use_id.clone())
                .filter(|id| open.contains(id))
                .collect(),
            _ => HashSet::new(),
        };

        let follower = match iter.peek() {
            Some(next) if next.role == Role::User => iter.next(),
            _ => None,
        };

        if unique_ids && answered.len() == open.len() {
            out.push(turn);
            if let Some(results) = follower.and_then(|f| retain_results(f, &open)) {
                out.push(results);
            }
        } else {
            tracing::debug!(
                calls = call_ids.len(),
                answered = answered.len(),
                "dropping assistant turn with unanswered tool calls"
            );
            if let Some(rest) = follower.and_then(|f| retain_results(f, &HashSet::new())) {
                out.push(rest);
            }
        }
    }

    out
}

/// Keep the first tool result for each id in `allowed`; drop all others.
fn retain_results(turn: Turn, allowed: &HashSet<String>) -> Option<Turn> {
    let Content::Blocks(blocks) = turn.content else {
        return Some(turn);
    };
    let mut seen: HashSet<String> = HashSet::new();
    let kept: Vec<Block> = blocks
        .into_iter()
        .filter(|block| match block {
            Block::ToolResult(ToolResultBlock { tool_use_id, .. }) => {
                allowed.contains(tool_use_id) && seen.insert(tool_use_id.clone())
            }
            _ => true,
        })
        .collect();
    if kept.is_empty() {
        return None;
    }
    Some(Turn {
        role: turn.role,
        content: Content::Blocks(kept),
    })
}

fn merge_adjacent_roles(turns: Vec<Turn>) -> Vec<Turn> {
    let mut out: Vec<Turn> = Vec::with_capacity(turns.len());
    for turn in turns {
        match out.last_mut() {
            Some(prev) if prev.role == turn.role => {
                let merged = std::mem::replace(&mut prev.content, Content::Blocks(Vec::new()));
                let mut blocks = merged.into_blocks();
                blocks.extend(turn.content.into_blocks());
                prev.content = Content::Blocks(blocks);
            }
            _ => out.push(turn),
        }
    }
    out
}

fn bound_sizes(turn: Turn, max_chars: usize) -> Turn {
    let content = match turn.content {
        Content::Text(text) => Content::Text(cap_text(text, max_chars)),
        Content::Blocks(blocks) => Content::Blocks(
            blocks
                .into_iter()
                .map(|block| match block {
                    Block::Text { text } => Block::Text {
                        text: cap_text(text, max_chars),
                    },
                    Block::ToolResult(mut result) => {
                        result.content = cap_text(result.content, max_chars);
                        Block::ToolResult(result)
                    }
                    other => other,
                })
                .collect(),
        ),
    };
    Turn {
        role: turn.role,
        content,
    }
}

fn replace_images(turn: Turn) -> Turn {
    let Content::Blocks(blocks) = turn.content else {
        return turn;
    };
    Turn {
        role: turn.role,
        content: Content::Blocks(
            blocks
                .into_iter()
                .map(|block| match block {
                    Block::Image(_) => Block::Text {
                        text: IMAGE_PLACEHOLDER.to_string(),
                    },
                    other => other,
                })
                .collect(),
        ),
    }
}
