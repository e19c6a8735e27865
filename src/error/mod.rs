//! Error types for the engine.

use thiserror::Error;

/// Primary error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Provider error: {provider} — {message}")]
    Provider { provider: String, message: String },

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Canceled")]
    Canceled,
}

/// Broad error category used to route retry and reporting logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimited,
    ServerError,
    ClientError,
    Timeout,
    Configuration,
    ToolExecution,
    Canceled,
    Other,
}

impl EngineError {
    /// Create an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Canceled => ErrorCategory::Canceled,
            Self::InvalidArgument(_) => ErrorCategory::ClientError,
            Self::Api { status, .. } => match status {
                429 => ErrorCategory::RateLimited,
                500..=599 => ErrorCategory::ServerError,
                400..=499 => ErrorCategory::ClientError,
                _ => ErrorCategory::Other,
            },
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimited | ErrorCategory::ServerError | ErrorCategory::Timeout
        )
    }

    /// Short text shown to the user when a round fails with this error.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::RateLimited => {
                "The model is rate limited right now. Please try again in a moment.".to_string()
            }
            ErrorCategory::ServerError | ErrorCategory::Timeout => {
                format!("The model service is having trouble ({self}). Please try again.")
            }
            _ => format!("Request failed: {self}"),
        }
    }
}

/// Error returned by a chat transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The edit would not change the message text.
    #[error("message is not modified")]
    Unchanged,

    /// The message to edit no longer exists.
    #[error("message to edit not found")]
    NotFound,

    #[error("transport error: {0}")]
    Other(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, EngineError>;
