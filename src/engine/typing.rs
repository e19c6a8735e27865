//! Periodic "typing" indicator.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::Transport;
use crate::types::ChatId;

/// Refreshes the typing indicator every `interval` until `stop` is cancelled.
///
/// Transport failures are logged and otherwise ignored; the task never
/// affects the round it decorates.
pub fn spawn_typing(
    transport: Arc<dyn Transport>,
    chat_id: ChatId,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !stop.is_cancelled() {
            if let Err(e) = transport.send_typing(chat_id).await {
                tracing::debug!(chat_id, error = %e, "typing indicator failed");
            }
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::MessageHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TypingCounter {
        typing: AtomicUsize,
    }

    #[async_trait]
    impl Transport for TypingCounter {
        fn max_message_len(&self) -> usize {
            4096
        }

        async fn send(&self, _chat_id: ChatId, _text: &str) -> Result<MessageHandle, TransportError> {
            Ok(MessageHandle(1))
        }

        async fn edit(&self, _: ChatId, _: MessageHandle, _: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_typing(&self, _chat_id: ChatId) -> Result<(), TransportError> {
            self.typing.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Other("flaky".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_until_stopped_despite_errors() {
        let transport = Arc::new(TypingCounter::default());
        let stop = CancellationToken::new();
        let handle = spawn_typing(transport.clone(), 1, Duration::from_secs(4), stop.clone());

        tokio::time::sleep(Duration::from_secs(9)).await;
        stop.cancel();
        handle.await.unwrap();

        assert_eq!(transport.typing.load(Ordering::SeqCst), 3);
    }
}
