//! The orchestration engine: per-chat sessions driving the tool-use loop.

pub mod round;
pub mod runner;
pub mod session;
pub mod typing;

use std::sync::Arc;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::resolve_model;
use crate::provider::ModelProvider;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::store::{ConversationStore, MemoryStore};
use crate::tools::{TodoList, ToolRegistry};
use crate::transport::{send_long_message, Transport};
use crate::types::{ChatId, Content, Role, RunResult, Turn};

pub use round::{RoundExecutor, RoundOutput};
pub use session::{ChatSession, SessionRegistry, SessionState};

pub const QUEUED_NOTICE: &str = "Queued — finishing current request first.";
pub const CANCELED_NOTICE: &str = "Cancelled. Your last message was discarded.";
pub const EMPTY_RESPONSE_NOTICE: &str = "(The model returned an empty response.)";

pub fn round_limit_notice(max_rounds: usize) -> String {
    format!(
        "Stopped after {max_rounds} tool rounds without a final answer. \
         Send another message to let me continue."
    )
}

/// Conversation orchestration engine.
///
/// One engine serves many chats. Each chat runs at most one message at a
/// time; further messages queue behind it.
pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn ModelProvider>,
    transport: Arc<dyn Transport>,
    tools: ToolRegistry,
    store: Arc<dyn ConversationStore>,
    sessions: SessionRegistry,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("provider", &self.provider.provider_name())
            .field("tools", &self.tools)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl Engine {
    /// Engine with no tools and an in-memory store.
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn ModelProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let tools = ToolRegistry::new(config.tool_timeout());
        Self {
            config,
            provider,
            transport,
            tools,
            store: Arc::new(MemoryStore::new()),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Process one user message to completion.
    ///
    /// Exactly one user-facing outcome is delivered: the answer, an error,
    /// a cancellation notice or a round-limit notice. History is rolled back
    /// on error and cancellation and saved in every case.
    pub async fn process(&self, chat_id: ChatId, input: impl Into<Content>) -> RunResult {
        let run_id = Uuid::new_v4();
        let content = input.into();
        if content.is_blank() {
            return RunResult::failed(run_id, 0, "empty message");
        }

        let session = self.sessions.get_or_create(chat_id);
        let mut state = match session.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::info!(chat_id, %run_id, "chat busy; queueing message");
                self.notify(chat_id, QUEUED_NOTICE).await;
                session.state.lock().await
            }
        };

        let result = self.run_locked(run_id, &session, &mut state, content).await;
        session.clear_cancel();
        result
    }

    /// Request cancellation of the chat's current run. A cancel issued while
    /// the chat is idle applies to its next run. Returns whether a run was
    /// in progress.
    pub fn cancel(&self, chat_id: ChatId) -> bool {
        let session = self.sessions.get_or_create(chat_id);
        session.cancel_token().cancel();
        let running = session.is_running();
        tracing::info!(chat_id, running, "cancellation requested");
        running
    }

    pub fn is_running(&self, chat_id: ChatId) -> bool {
        self.sessions
            .get(chat_id)
            .is_some_and(|session| session.is_running())
    }

    /// Forget the chat's history and checklist. Waits for a running message.
    pub async fn reset(&self, chat_id: ChatId) -> Result<(), EngineError> {
        let session = self.sessions.get_or_create(chat_id);
        let mut state = session.state.lock().await;
        state.turns = Some(Vec::new());
        state.todos.clear();
        state.persist_blocked = false;
        session.clear_cancel();
        tracing::info!(chat_id, "conversation reset");
        self.store.clear(chat_id)
    }

    /// Switch the chat's model. Accepts aliases (`opus`, `sonnet`, `haiku`)
    /// or full model ids; returns the resolved id.
    pub fn set_model(&self, chat_id: ChatId, model: &str) -> Result<String, EngineError> {
        let resolved = resolve_model(model);
        if resolved.is_empty() {
            return Err(EngineError::InvalidArgument("model name is empty".into()));
        }
        self.sessions
            .get_or_create(chat_id)
            .set_model_override(Some(resolved.clone()));
        Ok(resolved)
    }

    /// Model used for the chat's next round.
    pub fn model(&self, chat_id: ChatId) -> String {
        self.sessions
            .get(chat_id)
            .and_then(|session| session.model_override())
            .unwrap_or_else(|| self.config.model.clone())
    }

    /// Ambient state handed to tools through `ToolContext::metadata`, such
    /// as the chat's active repository. Saved to the store.
    pub fn set_tool_metadata(
        &self,
        chat_id: ChatId,
        metadata: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.store.save_metadata(chat_id, &metadata)?;
        self.sessions.get_or_create(chat_id).set_tool_metadata(metadata);
        Ok(())
    }

    /// The chat's tool metadata, loaded from the store on first use.
    fn tool_metadata(&self, session: &ChatSession) -> serde_json::Value {
        session.tool_metadata_or_load(|| {
            self.store.load_metadata(session.chat_id).unwrap_or_else(|e| {
                tracing::warn!(chat_id = session.chat_id, error = %e, "failed to load tool metadata");
                serde_json::Value::Null
            })
        })
    }

    /// Snapshot of the chat's history. Waits for a running message.
    pub async fn history(&self, chat_id: ChatId) -> Vec<Turn> {
        let session = self.sessions.get_or_create(chat_id);
        let mut state = session.state.lock().await;
        self.history_mut(chat_id, &mut state).clone()
    }

    /// The chat's current checklist. Waits for a running message.
    pub async fn todos(&self, chat_id: ChatId) -> TodoList {
        let session = self.sessions.get_or_create(chat_id);
        let state = session.state.lock().await;
        state.todos.clone()
    }

    fn sanitize_options(&self) -> SanitizeOptions {
        SanitizeOptions::from(&self.config)
    }

    /// History for the locked session, loading it from the store on first use.
    fn history_mut<'s>(&self, chat_id: ChatId, state: &'s mut SessionState) -> &'s mut Vec<Turn> {
        if state.turns.is_none() {
            let loaded = match self.store.load(chat_id) {
                Ok(turns) => turns,
                Err(e) => {
                    tracing::warn!(
                        chat_id,
                        error = %e,
                        "failed to load conversation; starting empty and leaving the stored copy untouched"
                    );
                    state.persist_blocked = true;
                    Vec::new()
                }
            };
            state.turns = Some(sanitize(&loaded, &self.sanitize_options()));
        }
        state.turns.get_or_insert_with(Vec::new)
    }

    /// Save the session's history unless its stored copy failed to load.
    fn persist(&self, chat_id: ChatId, state: &SessionState) {
        if state.persist_blocked {
            tracing::warn!(chat_id, "not saving conversation; stored history could not be read");
            return;
        }
        let Some(turns) = state.turns.as_deref() else {
            return;
        };
        if let Err(e) = self.store.save(chat_id, turns) {
            tracing::warn!(chat_id, error = %e, "failed to save conversation");
        }
    }

    /// Best-effort message to the user.
    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = send_long_message(self.transport.as_ref(), chat_id, text).await {
            tracing::warn!(chat_id, error = %e, "failed to deliver notice");
        }
    }

    fn user_turn(content: Content) -> Turn {
        Turn {
            role: Role::User,
            content,
        }
    }
}
