//! Shared test helpers: scripted provider and recording transport.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::Notify;

use parley::error::{EngineError, TransportError};
use parley::provider::{ModelProvider, ProviderRequest};
use parley::transport::{MessageHandle, Transport};
use parley::types::*;

/// What the provider does on one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Tools(Vec<ToolCall>),
    TextThenTools(String, Vec<ToolCall>),
    Fail(u16),
    /// Rate limited, with the server's `retry_after_ms` hint.
    RateLimited(Option<u64>),
}

pub fn text(t: &str) -> Reply {
    Reply::Text(t.to_string())
}

pub fn tool_call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

type Script = dyn Fn(usize) -> Reply + Send + Sync;

/// Provider whose replies come from a closure of the call index.
pub struct MockProvider {
    stream_script: Box<Script>,
    generate_script: Box<Script>,
    gate: Option<Arc<Notify>>,
    pub stream_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    /// Same script for streaming and fallback calls.
    pub fn new(script: impl Fn(usize) -> Reply + Send + Sync + Clone + 'static) -> Self {
        Self {
            stream_script: Box::new(script.clone()),
            generate_script: Box::new(script),
            gate: None,
            stream_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order, repeating the last one.
    pub fn sequence(replies: Vec<Reply>) -> Self {
        let replies = Arc::new(replies);
        Self::new(move |n| replies[n.min(replies.len() - 1)].clone())
    }

    pub fn with_generate(mut self, script: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Self {
        self.generate_script = Box::new(script);
        self
    }

    /// The first streaming call waits until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn stream_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn response(reply: Reply) -> Result<ModelResponse, EngineError> {
        let (text, calls) = match reply {
            Reply::Fail(status) => return Err(EngineError::api(status, "scripted failure")),
            Reply::RateLimited(retry_after_ms) => {
                return Err(EngineError::RateLimited { retry_after_ms })
            }
            Reply::Text(t) => (t, Vec::new()),
            Reply::Tools(calls) => (String::new(), calls),
            Reply::TextThenTools(t, calls) => (t, calls),
        };
        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(Block::Text { text });
        }
        let stop = if calls.is_empty() {
            StopReason::EndTurn
        } else {
            StopReason::ToolUse
        };
        content.extend(calls.into_iter().map(Block::ToolUse));
        Ok(ModelResponse {
            content,
            stop_reason: Some(stop),
            usage: Usage::default(),
        })
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ModelResponse, EngineError> {
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        Self::response((self.generate_script)(n))
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, EngineError>>, EngineError> {
        let n = self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if n == 0 {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
        let response = Self::response((self.stream_script)(n))?;
        let mut deltas: Vec<Result<StreamDelta, EngineError>> = Vec::new();
        for block in response.content {
            match block {
                Block::Text { text } => deltas.push(Ok(StreamDelta::text(text))),
                Block::ToolUse(call) => deltas.push(Ok(StreamDelta::tool_use(call))),
                _ => {}
            }
        }
        if let Some(stop) = response.stop_reason {
            deltas.push(Ok(StreamDelta::done(stop)));
        }
        Ok(Box::pin(async_stream::stream! {
            for delta in deltas {
                tokio::task::yield_now().await;
                yield delta;
            }
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message(String),
    Edit(i64, String),
}

/// Transport that records every call.
pub struct RecordingTransport {
    max_len: usize,
    pub log: Mutex<Vec<Sent>>,
    pub typing: AtomicUsize,
    next_id: AtomicUsize,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::with_max_len(4096)
    }
}

impl RecordingTransport {
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            log: Mutex::new(Vec::new()),
            typing: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Texts of new messages, in order.
    pub fn messages(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Message(text) => Some(text.clone()),
                Sent::Edit(..) => None,
            })
            .collect()
    }

    pub fn edits(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Sent::Edit(..)))
            .count()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn max_message_len(&self) -> usize {
        self.max_len
    }

    async fn send(&self, _chat_id: ChatId, text: &str) -> Result<MessageHandle, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        self.log.lock().unwrap().push(Sent::Message(text.to_string()));
        Ok(MessageHandle(id))
    }

    async fn edit(
        &self,
        _chat_id: ChatId,
        handle: MessageHandle,
        text: &str,
    ) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(Sent::Edit(handle.0, text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, _chat_id: ChatId) -> Result<(), TransportError> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A prior exchange used to seed stores.
pub fn prior_history() -> Vec<Turn> {
    vec![Turn::user("earlier question"), Turn::assistant("earlier answer")]
}
