//! Model provider seam.
//!
//! The engine never talks HTTP itself; callers plug in a [`ModelProvider`]
//! that speaks to their LLM API and maps its failures onto [`EngineError`]
//! (`RateLimited`, `Api { status }` for 5xx/4xx, `Timeout`, ...).

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{GenerationSettings, ModelResponse, StreamDelta, Turn};

/// A request for one round.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: String,
    /// Sanitized history, starting with a user turn.
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Core trait implemented by model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g. "anthropic"), used in logs.
    fn provider_name(&self) -> &str;

    /// Non-streaming invocation returning the full structured response.
    async fn generate(&self, request: &ProviderRequest) -> Result<ModelResponse, EngineError>;

    /// Streaming invocation. Tool calls arrive as complete `ToolUse` deltas;
    /// the stream ends with a `Done` delta carrying the stop reason.
    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta, EngineError>>, EngineError>;
}
