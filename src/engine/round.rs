//! One provider invocation: streaming first, non-streaming fallback.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::provider::{ModelProvider, ProviderRequest};
use crate::streaming::StreamingResponder;
use crate::transport::Transport;
use crate::types::{Block, ChatId, ModelResponse, StopReason, StreamEventType, Usage};
use crate::util::timeout::with_timeout;

/// What a round produced.
#[derive(Debug)]
pub struct RoundOutput {
    pub response: ModelResponse,
    /// Text already shown to the user while streaming.
    pub streamed_text: String,
    /// Whether streaming delivered at least one message.
    pub delivered: bool,
    /// Whether the non-streaming fallback produced the response.
    pub used_fallback: bool,
}

/// Runs single rounds against a provider.
pub struct RoundExecutor<'a> {
    provider: &'a dyn ModelProvider,
    transport: Arc<dyn Transport>,
    config: &'a EngineConfig,
    chat_id: ChatId,
}

impl<'a> RoundExecutor<'a> {
    pub fn new(
        provider: &'a dyn ModelProvider,
        transport: Arc<dyn Transport>,
        config: &'a EngineConfig,
        chat_id: ChatId,
    ) -> Self {
        Self {
            provider,
            transport,
            config,
            chat_id,
        }
    }

    /// Execute one round.
    ///
    /// `typing_stop` is cancelled as soon as the first text delta arrives.
    /// A transient failure before any text was shown switches to the
    /// non-streaming call under the retry policy; anything else propagates.
    pub async fn execute(
        &self,
        request: &ProviderRequest,
        typing_stop: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Result<RoundOutput, EngineError> {
        let mut responder =
            StreamingResponder::from_config(self.transport.clone(), self.chat_id, self.config)
                .with_cancellation(cancel.clone());

        match self.stream_round(request, &mut responder, typing_stop, cancel).await {
            Ok(response) => {
                responder.finalize().await;
                Ok(RoundOutput {
                    response,
                    delivered: responder.has_delivered(),
                    streamed_text: responder.text().to_string(),
                    used_fallback: false,
                })
            }
            Err(e) if e.is_retryable() && responder.text().is_empty() => {
                tracing::warn!(
                    chat_id = self.chat_id,
                    provider = self.provider.provider_name(),
                    error = %e,
                    "streaming failed; falling back to non-streaming call"
                );
                let response = self.generate_with_retry(request, cancel).await?;
                Ok(RoundOutput {
                    response,
                    streamed_text: String::new(),
                    delivered: false,
                    used_fallback: true,
                })
            }
            Err(e) => {
                responder.finalize().await;
                Err(e)
            }
        }
    }

    async fn stream_round(
        &self,
        request: &ProviderRequest,
        responder: &mut StreamingResponder,
        typing_stop: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, EngineError> {
        let timeout = self.config.provider_timeout();
        let mut stream = with_timeout(timeout, self.provider.stream(request)).await?;

        let mut content: Vec<Block> = Vec::new();
        let mut stop_reason = None;
        let mut usage = Usage::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Canceled),
                next = tokio::time::timeout(timeout, stream.next()) => next,
            };
            let delta = match next {
                Err(_) => return Err(EngineError::Timeout(timeout.as_millis() as u64)),
                Ok(None) => break,
                Ok(Some(delta)) => delta?,
            };

            match delta.event_type {
                StreamEventType::TextDelta => {
                    if delta.text.is_empty() {
                        continue;
                    }
                    typing_stop.cancel();
                    responder.feed(&delta.text).await;
                    match content.last_mut() {
                        Some(Block::Text { text }) => text.push_str(&delta.text),
                        _ => content.push(Block::Text { text: delta.text }),
                    }
                }
                StreamEventType::ThinkingDelta => match content.last_mut() {
                    Some(Block::Thinking { thinking }) => thinking.push_str(&delta.text),
                    _ => content.push(Block::Thinking { thinking: delta.text }),
                },
                StreamEventType::ToolUse => {
                    if let Some(call) = delta.tool_call {
                        content.push(Block::ToolUse(call));
                    }
                }
                StreamEventType::Done => {
                    stop_reason = delta.stop_reason;
                    if let Some(u) = delta.usage {
                        usage.merge(&u);
                    }
                    break;
                }
                StreamEventType::Error => return Err(EngineError::Stream(delta.text)),
            }
        }

        let requests_tools = content.iter().any(|b| matches!(b, Block::ToolUse(_)));
        let stop_reason = stop_reason.or(Some(if requests_tools {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        }));
        tracing::debug!(
            chat_id = self.chat_id,
            blocks = content.len(),
            ?stop_reason,
            output_tokens = usage.output_tokens,
            "stream finished"
        );
        Ok(ModelResponse {
            content,
            stop_reason,
            usage,
        })
    }

    async fn generate_with_retry(
        &self,
        request: &ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, EngineError> {
        let timeout = self.config.provider_timeout();
        let policy = self.config.retry_policy();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Canceled),
            result = policy.execute(|| with_timeout(timeout, self.provider.generate(request))) => result,
        }
    }
}
