//! Progressive delivery of streamed model text.
//!
//! [`StreamingResponder`] accumulates text deltas and mirrors them into chat
//! messages: the first flush sends a message, later flushes edit it, and
//! once the uncommitted text outgrows the split threshold the message is
//! closed and a new one opened. Edits are throttled to one per interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::TransportError;
use crate::transport::{MessageHandle, Transport};
use crate::types::ChatId;
use crate::util::truncate::char_boundary;

const FENCE: &str = "```";

/// Append a closing fence when `text` has an odd number of ``` markers.
pub fn close_unclosed_code_fences(text: &str) -> String {
    if text.matches(FENCE).count() % 2 == 1 {
        format!("{text}\n{FENCE}")
    } else {
        text.to_string()
    }
}

/// Where a responder is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Nothing delivered yet.
    Idle,
    /// At least one message delivered; more text may follow.
    Streaming,
    Finalized,
    /// A transport error stopped delivery; remaining flushes are no-ops.
    Failed,
}

/// Streams text into throttled, size-bounded chat messages.
pub struct StreamingResponder {
    transport: Arc<dyn Transport>,
    chat_id: ChatId,
    throttle: Duration,
    split_threshold: usize,
    cancel: Option<CancellationToken>,
    accumulated: String,
    /// Byte offset of text already closed into finished messages.
    committed: usize,
    current: Option<MessageHandle>,
    /// Text last shown in `current`.
    shown: String,
    last_flush: Option<Instant>,
    messages_sent: usize,
    dirty: bool,
    failed: bool,
    finalized: bool,
}

impl std::fmt::Debug for StreamingResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponder")
            .field("chat_id", &self.chat_id)
            .field("accumulated_len", &self.accumulated.len())
            .field("committed", &self.committed)
            .field("current", &self.current)
            .field("phase", &self.phase())
            .finish()
    }
}

impl StreamingResponder {
    pub fn new(
        transport: Arc<dyn Transport>,
        chat_id: ChatId,
        throttle: Duration,
        split_threshold: usize,
    ) -> Self {
        Self {
            transport,
            chat_id,
            throttle,
            split_threshold: split_threshold.max(1),
            cancel: None,
            accumulated: String::new(),
            committed: 0,
            current: None,
            shown: String::new(),
            last_flush: None,
            messages_sent: 0,
            dirty: false,
            failed: false,
            finalized: false,
        }
    }

    /// Responder using the throttle and split threshold from `config`.
    pub fn from_config(transport: Arc<dyn Transport>, chat_id: ChatId, config: &EngineConfig) -> Self {
        Self::new(
            transport,
            chat_id,
            config.throttle_interval(),
            config.split_threshold(),
        )
    }

    /// Stop delivering once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// All text fed so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Number of messages successfully sent (not counting edits).
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    pub fn has_delivered(&self) -> bool {
        self.messages_sent > 0
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn phase(&self) -> StreamPhase {
        if self.failed {
            StreamPhase::Failed
        } else if self.finalized {
            StreamPhase::Finalized
        } else if self.messages_sent > 0 {
            StreamPhase::Streaming
        } else {
            StreamPhase::Idle
        }
    }

    /// Append a chunk; flushes when the throttle interval has passed.
    pub async fn feed(&mut self, chunk: &str) {
        if self.finalized || chunk.is_empty() {
            return;
        }
        self.accumulated.push_str(chunk);
        self.dirty = true;

        let due = self
            .last_flush
            .map_or(true, |last| last.elapsed() >= self.throttle);
        if due {
            self.flush().await;
        }
    }

    /// Deliver whatever is still pending. Calling this again is a no-op.
    pub async fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        if self.dirty || self.current.is_none() {
            self.flush().await;
        }
        self.finalized = true;
    }

    async fn flush(&mut self) {
        self.dirty = false;
        self.last_flush = Some(Instant::now());

        if self.failed || self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return;
        }

        // Close full-size messages until the remainder fits.
        loop {
            let pending = &self.accumulated[self.committed..];
            if pending.trim().is_empty() {
                return;
            }
            let Some(cut) = char_boundary(pending, self.split_threshold) else {
                break;
            };
            let head = &pending[..cut];
            if !head.trim().is_empty() {
                let display = self.render(head);
                self.deliver(display).await;
                if self.failed {
                    return;
                }
            }
            tracing::debug!(chat_id = self.chat_id, committed = self.committed + cut, "splitting streamed message");
            self.committed += cut;
            self.current = None;
            self.shown.clear();
        }

        let display = self.render(&self.accumulated[self.committed..]);
        self.deliver(display).await;
    }

    /// Display form of an uncommitted segment. A fence left open by an
    /// earlier message is reopened, and an unterminated one is closed.
    fn render(&self, segment: &str) -> String {
        let reopen = self.accumulated[..self.committed].matches(FENCE).count() % 2 == 1;
        if reopen {
            close_unclosed_code_fences(&format!("{FENCE}\n{segment}"))
        } else {
            close_unclosed_code_fences(segment)
        }
    }

    /// Send a new message or edit the open one.
    async fn deliver(&mut self, display: String) {
        match self.current {
            None => match self.transport.send(self.chat_id, &display).await {
                Ok(handle) => {
                    self.current = Some(handle);
                    self.messages_sent += 1;
                    self.shown = display;
                }
                Err(e) => {
                    tracing::warn!(chat_id = self.chat_id, error = %e, "failed to send streamed message");
                    self.failed = true;
                }
            },
            Some(_) if self.shown == display => {}
            Some(handle) => match self.transport.edit(self.chat_id, handle, &display).await {
                Ok(()) | Err(TransportError::Unchanged) => self.shown = display,
                Err(TransportError::NotFound) => {
                    tracing::warn!(chat_id = self.chat_id, message = handle.0, "streamed message vanished; stopping updates");
                    self.failed = true;
                }
                Err(e) => {
                    tracing::warn!(chat_id = self.chat_id, message = handle.0, error = %e, "failed to edit streamed message");
                    self.failed = true;
                }
            },
        }
    }
}
