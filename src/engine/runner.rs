//! The bounded round loop behind [`Engine::process`].

use tokio_util::sync::CancellationToken;

use super::round::RoundExecutor;
use super::session::{ChatSession, SessionState};
use super::typing::spawn_typing;
use super::{round_limit_notice, Engine, CANCELED_NOTICE, EMPTY_RESPONSE_NOTICE};
use crate::error::EngineError;
use crate::provider::{ProviderRequest, ToolDefinition};
use crate::sanitize::sanitize;
use crate::tools::{ProgressTracker, TodoList, ToolContext, ToolOutcome, UPDATE_TODOS};
use crate::types::{Content, RunId, RunResult, ToolCall, Turn};

/// How the round loop ended.
#[derive(Debug)]
enum RunOutcome {
    Completed,
    Canceled,
    RoundLimit,
    Failed(EngineError),
}

impl Engine {
    /// Run a message while holding the chat's lock.
    pub(super) async fn run_locked(
        &self,
        run_id: RunId,
        session: &ChatSession,
        state: &mut SessionState,
        content: Content,
    ) -> RunResult {
        let chat_id = session.chat_id;
        let cancel = session.cancel_token();
        let options = self.sanitize_options();

        let history = self.history_mut(chat_id, state);
        let checkpoint = history.clone();
        history.push(Self::user_turn(content));
        *history = sanitize(history, &options);

        let mut rounds = 0;
        let outcome = self
            .run_rounds(run_id, session, state, &cancel, &mut rounds)
            .await;

        let history = self.history_mut(chat_id, state);
        let result = match outcome {
            RunOutcome::Completed => {
                tracing::info!(chat_id, %run_id, rounds, "run completed");
                RunResult::completed(run_id, rounds)
            }
            RunOutcome::RoundLimit => {
                tracing::info!(chat_id, %run_id, rounds, "round limit reached");
                self.notify(chat_id, &round_limit_notice(self.config.max_rounds))
                    .await;
                RunResult::round_limit(run_id, rounds)
            }
            RunOutcome::Canceled => {
                *history = checkpoint;
                tracing::info!(chat_id, %run_id, rounds, "run canceled; history rolled back");
                self.notify(chat_id, CANCELED_NOTICE).await;
                RunResult::canceled(run_id, rounds)
            }
            RunOutcome::Failed(e) => {
                *history = checkpoint;
                tracing::error!(chat_id, %run_id, rounds, error = %e, "run failed; history rolled back");
                self.notify(chat_id, &e.user_message()).await;
                RunResult::failed(run_id, rounds, e.to_string())
            }
        };

        self.persist(chat_id, state);
        result
    }

    async fn run_rounds(
        &self,
        run_id: RunId,
        session: &ChatSession,
        state: &mut SessionState,
        cancel: &CancellationToken,
        rounds: &mut usize,
    ) -> RunOutcome {
        let chat_id = session.chat_id;
        let options = self.sanitize_options();
        let model = session
            .model_override()
            .unwrap_or_else(|| self.config.model.clone());
        let tool_definitions = self.tool_definitions();
        let mut progress = self
            .config
            .tool_progress
            .then(|| ProgressTracker::new(self.config.tool_progress_gap()));

        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                return RunOutcome::Canceled;
            }
            *rounds = round;
            tracing::debug!(chat_id, %run_id, round, "starting round");

            let request = ProviderRequest {
                model: model.clone(),
                system_prompt: self.config.system_prompt.clone(),
                turns: self.history_mut(chat_id, state).clone(),
                tools: tool_definitions.clone(),
                settings: self.config.generation_settings(),
            };

            let typing_stop = CancellationToken::new();
            let typing = spawn_typing(
                self.transport.clone(),
                chat_id,
                self.config.typing_interval(),
                typing_stop.clone(),
            );
            let executor = RoundExecutor::new(
                self.provider.as_ref(),
                self.transport.clone(),
                &self.config,
                chat_id,
            );
            let result = executor.execute(&request, &typing_stop, cancel).await;
            typing_stop.cancel();
            if let Err(e) = typing.await {
                tracing::debug!(chat_id, error = %e, "typing task ended abnormally");
            }

            let output = match result {
                Ok(output) => output,
                Err(EngineError::Canceled) => return RunOutcome::Canceled,
                Err(e) => return RunOutcome::Failed(e),
            };
            // A response that lands after a cancel is discarded.
            if cancel.is_cancelled() {
                return RunOutcome::Canceled;
            }

            let response = output.response;
            self.history_mut(chat_id, state).push(response.to_turn());

            if !response.requests_tools() {
                if !output.delivered {
                    let text = response.text_content();
                    let text = if text.trim().is_empty() {
                        EMPTY_RESPONSE_NOTICE.to_string()
                    } else {
                        text
                    };
                    self.notify(chat_id, &text).await;
                }
                let history = self.history_mut(chat_id, state);
                *history = sanitize(history, &options);
                return RunOutcome::Completed;
            }

            // Commentary from a non-streamed response still precedes the tools.
            let commentary = response.text_content();
            if !output.delivered && !commentary.trim().is_empty() {
                self.notify(chat_id, &commentary).await;
            }

            let calls: Vec<ToolCall> = response.tool_calls().into_iter().cloned().collect();
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                if let Some(line) = progress.as_mut().and_then(|p| p.observe(call)) {
                    if let Err(e) = self.transport.send(chat_id, &line).await {
                        tracing::debug!(chat_id, error = %e, "failed to send tool progress");
                    }
                }
                let outcome = self.run_tool(session, &mut state.todos, call).await;
                tracing::debug!(
                    chat_id,
                    %run_id,
                    round,
                    tool = %call.name,
                    is_error = outcome.is_error(),
                    "tool finished"
                );
                results.push(outcome.into_result_block(&call.id, self.config.max_tool_result_chars));
            }

            let history = self.history_mut(chat_id, state);
            history.push(Turn::tool_results(results));
            *history = sanitize(history, &options);
        }

        // A cancel during the last round's tools still wins over the limit.
        if cancel.is_cancelled() {
            return RunOutcome::Canceled;
        }
        RunOutcome::RoundLimit
    }

    /// Apply the built-in checklist tool or dispatch to the registry.
    async fn run_tool(&self, session: &ChatSession, todos: &mut TodoList, call: &ToolCall) -> ToolOutcome {
        if call.name == UPDATE_TODOS {
            return match todos.apply(&call.input) {
                Ok(rendered) => ToolOutcome::Success(rendered),
                Err(e) => ToolOutcome::Error(format!("Tool error: {e}")),
            };
        }
        let ctx = ToolContext {
            chat_id: session.chat_id,
            tool_use_id: call.id.clone(),
            metadata: self.tool_metadata(session),
        };
        self.tools.dispatch(call, &ctx).await
    }

    /// Registered tools plus the built-in checklist, which shadows any
    /// registered tool of the same name.
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .definitions()
            .into_iter()
            .filter(|def| def.name != UPDATE_TODOS)
            .collect();
        definitions.push(TodoList::definition());
        definitions
    }
}
