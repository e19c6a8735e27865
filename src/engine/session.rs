//! Per-chat session registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::tools::TodoList;
use crate::types::{ChatId, Turn};

/// State guarded by a chat's run lock.
#[derive(Debug, Default)]
pub struct SessionState {
    /// `None` until history is loaded from the store.
    pub turns: Option<Vec<Turn>>,
    pub todos: TodoList,
    /// Set when stored history could not be read; saving would overwrite it.
    pub persist_blocked: bool,
}

/// Everything the engine tracks for one chat.
#[derive(Debug)]
pub struct ChatSession {
    pub chat_id: ChatId,
    /// Held for the whole of a run; a second message waits here.
    pub state: tokio::sync::Mutex<SessionState>,
    cancel: Mutex<Option<CancellationToken>>,
    model: Mutex<Option<String>>,
    /// Passed to tools as `ToolContext::metadata`. `None` until loaded.
    tool_metadata: Mutex<Option<serde_json::Value>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChatSession {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            state: tokio::sync::Mutex::new(SessionState::default()),
            cancel: Mutex::new(None),
            model: Mutex::new(None),
            tool_metadata: Mutex::new(None),
        }
    }

    /// The chat's cancel token, created on first use.
    pub fn cancel_token(&self) -> CancellationToken {
        lock(&self.cancel).get_or_insert_with(CancellationToken::new).clone()
    }

    /// Drop the token so the next run starts uncancelled.
    pub fn clear_cancel(&self) {
        lock(&self.cancel).take();
    }

    pub fn is_running(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub fn model_override(&self) -> Option<String> {
        lock(&self.model).clone()
    }

    pub fn set_model_override(&self, model: Option<String>) {
        *lock(&self.model) = model;
    }

    /// Cached metadata, filling it with `load` on first use.
    pub fn tool_metadata_or_load(&self, load: impl FnOnce() -> serde_json::Value) -> serde_json::Value {
        lock(&self.tool_metadata).get_or_insert_with(load).clone()
    }

    pub fn set_tool_metadata(&self, metadata: serde_json::Value) {
        *lock(&self.tool_metadata) = Some(metadata);
    }
}

/// Lazily populated map of chat sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChatId, Arc<ChatSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, chat_id: ChatId) -> Arc<ChatSession> {
        lock(&self.sessions)
            .entry(chat_id)
            .or_insert_with(|| Arc::new(ChatSession::new(chat_id)))
            .clone()
    }

    pub fn get(&self, chat_id: ChatId) -> Option<Arc<ChatSession>> {
        lock(&self.sessions).get(&chat_id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }
}
