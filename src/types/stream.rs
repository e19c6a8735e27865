//! Streaming types.

use serde::{Deserialize, Serialize};

use super::generation::StopReason;
use super::message::ToolCall;
use super::usage::Usage;

/// A delta emitted by a streaming provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    /// The incremental text chunk (text and thinking deltas).
    pub text: String,
    /// Event type.
    pub event_type: StreamEventType,
    /// Fully decoded tool call (only on `ToolUse` events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Stop reason (only on the final delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// Usage (typically only on the final delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Type of stream event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    /// Incremental answer text.
    TextDelta,
    /// Incremental model reasoning.
    ThinkingDelta,
    /// A complete tool-use request.
    ToolUse,
    /// Stream finished.
    Done,
    /// Error reported inside the stream.
    Error,
}

impl StreamDelta {
    fn event(event_type: StreamEventType) -> Self {
        Self {
            text: String::new(),
            event_type,
            tool_call: None,
            stop_reason: None,
            usage: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::event(StreamEventType::TextDelta)
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::event(StreamEventType::ThinkingDelta)
        }
    }

    pub fn tool_use(call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Self::event(StreamEventType::ToolUse)
        }
    }

    pub fn done(stop_reason: StopReason) -> Self {
        Self {
            stop_reason: Some(stop_reason),
            ..Self::event(StreamEventType::Done)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            ..Self::event(StreamEventType::Error)
        }
    }
}
