//! Name-keyed tool registry and the total dispatch boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::tool::{Tool, ToolContext};
use crate::error::EngineError;
use crate::provider::ToolDefinition;
use crate::types::{ToolCall, ToolResultBlock};
use crate::util::truncate::cap_text;

/// Outcome of one tool call. Failures are conversation content, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::Error(text) => text,
        }
    }

    /// Wrap into a `tool_result` block, capping the content at `max_chars`.
    pub fn into_result_block(self, tool_use_id: impl Into<String>, max_chars: usize) -> ToolResultBlock {
        let is_error = self.is_error();
        let content = match self {
            Self::Success(text) | Self::Error(text) => cap_text(text, max_chars),
        };
        ToolResultBlock {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
        }
    }
}

/// Registered tools, dispatched by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replacing registered tool");
        }
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute `call`. Never fails: unknown tools, tool errors, panics and
    /// timeouts all become [`ToolOutcome::Error`].
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name).cloned() else {
            tracing::warn!(tool = %call.name, "model called an unregistered tool");
            return ToolOutcome::Error(format!("Tool '{}' is not available", call.name));
        };

        let input = call.input.clone();
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move { tool.execute(&input, &ctx).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(text))) => ToolOutcome::Success(text),
            Ok(Ok(Err(e))) => {
                tracing::warn!(tool = %call.name, error = %e, "tool returned an error");
                ToolOutcome::Error(format!("Tool error: {}", tool_error_text(e)))
            }
            Ok(Err(join_err)) => {
                tracing::error!(tool = %call.name, error = %join_err, "tool task failed");
                ToolOutcome::Error(format!("Tool error: {} crashed", call.name))
            }
            Err(_) => {
                abort.abort();
                tracing::warn!(tool = %call.name, timeout_ms = self.timeout.as_millis() as u64, "tool timed out");
                ToolOutcome::Error(format!(
                    "Tool error: {} timed out after {}s",
                    call.name,
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

fn tool_error_text(err: EngineError) -> String {
    match err {
        EngineError::ToolExecution { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::ToolSchema;
    use crate::tools::tool::FnTool;
    use crate::util::truncate::TRUNCATION_MARKER;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: name.into(),
            input: json!({ "word": "hi" }),
        }
    }

    async fn explode(_input: serde_json::Value, _ctx: ToolContext) -> Result<String, EngineError> {
        panic!("tool blew up")
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Duration::from_secs(5))
            .with_tool(FnTool::new(
                "echo",
                "Echo a word",
                ToolSchema::object().string("word", "Word", true).build(),
                |input, _ctx| async move {
                    Ok::<_, EngineError>(input["word"].as_str().unwrap_or_default().to_string())
                },
            ))
            .with_tool(FnTool::new("fail", "Always fails", ToolSchema::empty(), |_, _| async {
                Err::<String, _>(EngineError::ToolExecution {
                    tool_name: "fail".into(),
                    message: "boom".into(),
                })
            }))
            .with_tool(FnTool::new("panic", "Panics", ToolSchema::empty(), explode))
            .with_tool(FnTool::new("slow", "Sleeps", ToolSchema::empty(), |_, _| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, EngineError>("late".to_string())
            }))
    }

    #[tokio::test]
    async fn successful_call_returns_text() {
        let outcome = registry().dispatch(&call("echo"), &ToolContext::default()).await;
        assert_eq!(outcome, ToolOutcome::Success("hi".into()));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_unavailable() {
        let outcome = registry().dispatch(&call("teleport"), &ToolContext::default()).await;
        assert!(outcome.is_error());
        assert!(outcome.text().contains("not available"));
    }

    #[tokio::test]
    async fn tool_errors_and_panics_become_text() {
        let reg = registry();
        let failed = reg.dispatch(&call("fail"), &ToolContext::default()).await;
        assert_eq!(failed, ToolOutcome::Error("Tool error: boom".into()));

        let panicked = reg.dispatch(&call("panic"), &ToolContext::default()).await;
        assert!(panicked.text().starts_with("Tool error"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let outcome = registry().dispatch(&call("slow"), &ToolContext::default()).await;
        assert!(outcome.is_error());
        assert!(outcome.text().contains("timed out"));
    }

    #[test]
    fn result_block_is_capped() {
        let block = ToolOutcome::Success("y".repeat(50)).into_result_block("t1", 10);
        assert!(block.content.ends_with(TRUNCATION_MARKER));
        assert!(!block.is_error);
        assert_eq!(block.tool_use_id, "t1");
    }

    #[test]
    fn definitions_are_sorted() {
        let names: Vec<String> = registry().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "fail", "panic", "slow"]);
    }
}
