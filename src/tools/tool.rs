//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::schema::ToolSchema;
use crate::error::EngineError;
use crate::provider::ToolDefinition;
use crate::types::ChatId;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub chat_id: ChatId,
    /// Id of the `tool_use` block being answered.
    pub tool_use_id: String,
    /// Caller-supplied ambient state (active repository, branch, ...).
    pub metadata: serde_json::Value,
}

/// A capability the model can call by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the input object.
    fn schema(&self) -> &ToolSchema;

    /// Run the tool and return its text result.
    async fn execute(
        &self,
        input: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, EngineError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.schema().schema.clone(),
        }
    }
}

type ToolHandler = dyn Fn(
        serde_json::Value,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send>>
    + Send
    + Sync;

/// Tool backed by an async closure.
pub struct FnTool {
    name: String,
    description: String,
    schema: ToolSchema,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, EngineError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(move |input, ctx| Box::pin(handler(input, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(
        &self,
        input: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, EngineError> {
        (self.handler)(input.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
