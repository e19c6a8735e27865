//! Convenience re-exports for common use.

pub use crate::config::EngineConfig;
pub use crate::engine::Engine;
pub use crate::error::{EngineError, Result, TransportError};
pub use crate::models::ModelAlias;
pub use crate::provider::{ModelProvider, ProviderRequest, ToolDefinition};
pub use crate::store::{ConversationStore, FileStore, MemoryStore};
pub use crate::tools::{FnTool, Tool, ToolContext, ToolRegistry, ToolSchema};
pub use crate::transport::{MessageHandle, Transport};
pub use crate::types::{
    Block, ChatId, Content, ModelResponse, Role, RunResult, RunStatus, StopReason, StreamDelta,
    StreamEventType, Turn, Usage,
};
