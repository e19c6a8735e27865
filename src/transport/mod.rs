//! Chat transport seam.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::ChatId;
use crate::util::truncate::char_boundary;

/// Identifier of a message already delivered to a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub i64);

/// The chat surface the engine delivers to.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Maximum characters in one message.
    fn max_message_len(&self) -> usize;

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<MessageHandle, TransportError>;

    /// Replace the text of an earlier message.
    ///
    /// Returns [`TransportError::Unchanged`] when the text is identical and
    /// [`TransportError::NotFound`] when the message is gone.
    async fn edit(
        &self,
        chat_id: ChatId,
        handle: MessageHandle,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Show a "typing" indicator. Failures are ignored by the engine.
    async fn send_typing(&self, _chat_id: ChatId) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Split `text` into chunks of at most `max_len` characters, preferring to
/// break after a newline in the second half of a chunk.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some(limit) = char_boundary(rest, max_len) {
        if limit == rest.len() {
            break;
        }
        let window = &rest[..limit];
        let cut = match window.rfind('\n') {
            Some(nl) if nl + 1 >= limit / 2 => nl + 1,
            _ => limit,
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Send `text` as one or more messages, splitting at the transport limit.
/// Returns the handle of the last message sent.
pub async fn send_long_message(
    transport: &dyn Transport,
    chat_id: ChatId,
    text: &str,
) -> Result<Option<MessageHandle>, TransportError> {
    let mut last = None;
    for chunk in split_message(text, transport.max_message_len()) {
        if chunk.trim().is_empty() {
            continue;
        }
        last = Some(transport.send(chat_id, chunk).await?);
    }
    Ok(last)
}
