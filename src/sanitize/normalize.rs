//! Conversion of loosely shaped JSON history into canonical turns.
//!
//! Persisted history may come from older versions or from provider SDK
//! objects serialized as-is. Everything is mapped onto the closed [`Block`]
//! union here so the sanitizer never has to guess at shapes.

use serde_json::Value;

use crate::types::{Block, Content, ImageContent, Role, ToolCall, ToolResultBlock, Turn};

/// Normalize a list of raw turn objects, dropping entries that cannot be read.
pub fn normalize_turns(values: &[Value]) -> Vec<Turn> {
    values.iter().filter_map(normalize_turn).collect()
}

/// Normalize one raw turn object.
pub fn normalize_turn(value: &Value) -> Option<Turn> {
    let role = match value.get("role").and_then(Value::as_str)? {
        "user" | "tool" => Role::User,
        "assistant" | "model" => Role::Assistant,
        other => {
            tracing::debug!(role = other, "dropping turn with unsupported role");
            return None;
        }
    };
    let content = match value.get("content")? {
        Value::String(text) => Content::Text(text.clone()),
        Value::Array(items) => Content::Blocks(items.iter().filter_map(normalize_block).collect()),
        obj @ Value::Object(_) => Content::Blocks(normalize_block(obj).into_iter().collect()),
        _ => return None,
    };
    Some(Turn { role, content })
}

/// Normalize one raw content block.
pub fn normalize_block(value: &Value) -> Option<Block> {
    if let Value::String(text) = value {
        return Some(Block::Text { text: text.clone() });
    }
    let kind = value.get("type").and_then(Value::as_str)?;
    match kind {
        "text" => Some(Block::Text {
            text: str_field(value, &["text"])?.to_string(),
        }),
        "thinking" | "redacted_thinking" | "reasoning" => Some(Block::Thinking {
            thinking: str_field(value, &["thinking", "text", "data"])
                .unwrap_or_default()
                .to_string(),
        }),
        "image" => normalize_image(value).map(Block::Image),
        "tool_use" | "tool_call" => {
            let input = value
                .get("input")
                .or_else(|| value.get("arguments"))
                .map(parse_arguments)
                .unwrap_or_else(|| Value::Object(Default::default()));
            Some(Block::ToolUse(ToolCall {
                id: str_field(value, &["id", "tool_call_id"])?.to_string(),
                name: str_field(value, &["name"])?.to_string(),
                input,
            }))
        }
        "tool_result" => Some(Block::ToolResult(ToolResultBlock {
            tool_use_id: str_field(value, &["tool_use_id", "toolUseId", "tool_call_id"])?
                .to_string(),
            content: flatten_result_content(value.get("content").or_else(|| value.get("result"))),
            is_error: value
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })),
        other => {
            tracing::debug!(block_type = other, "dropping unknown content block");
            None
        }
    }
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
}

fn normalize_image(value: &Value) -> Option<ImageContent> {
    let source = value.get("source").unwrap_or(value);
    let media_type = str_field(source, &["media_type", "mime_type"])?;
    let data = str_field(source, &["data", "url"])?;
    Some(ImageContent {
        media_type: media_type.to_string(),
        data: data.to_string(),
    })
}

/// Tool arguments sometimes arrive JSON-encoded as a string.
fn parse_arguments(value: &Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn flatten_result_content(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.clone()),
                other => other.get("text").and_then(Value::as_str).map(str::to_string),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}
