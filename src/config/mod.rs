//! Engine configuration (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::GenerationSettings;
use crate::util::retry::RetryPolicy;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant responding through a chat app. Keep responses concise but thorough.";
/// Display headroom reserved below the transport limit, in percent.
const SPLIT_HEADROOM_PERCENT: usize = 95;
/// Room for the fences added around a split message.
const FENCE_RESERVE: usize = 8;

const ENV_PREFIX: &str = "PARLEY_";

/// Tunables for the orchestration loop, streaming delivery and sanitizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Model used when a chat has no override.
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    /// Provider rounds allowed per user message.
    pub max_rounds: usize,
    /// Minimum gap between streamed message edits.
    pub throttle_interval_ms: u64,
    /// Maximum characters in one transport message.
    pub max_message_len: usize,
    /// Characters after which a streamed message is closed and a new one opened.
    /// Defaults to 95% of `max_message_len`.
    pub split_threshold: Option<usize>,
    /// Cap applied to each tool result before it enters history.
    pub max_tool_result_chars: usize,
    /// Ceiling the sanitizer applies to every text and tool-result payload.
    pub max_history_block_chars: usize,
    /// Images are kept only in this many most recent turns.
    pub image_retention_turns: usize,
    /// Turns kept per conversation; older ones are dropped.
    pub max_history_turns: usize,
    pub provider_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    /// Interval between typing indicator refreshes.
    pub typing_interval_ms: u64,
    /// Provider attempts in the non-streaming fallback, including the first.
    pub retry_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// Send a short progress line for each tool call.
    pub tool_progress: bool,
    pub tool_progress_gap_ms: u64,
    /// Directory for the file conversation store.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: crate::models::ModelAlias::Sonnet.model_id().to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 8192,
            max_rounds: 15,
            throttle_interval_ms: 1_000,
            max_message_len: 4096,
            split_threshold: None,
            max_tool_result_chars: 8_000,
            max_history_block_chars: 8_000,
            image_retention_turns: 4,
            max_history_turns: 100,
            provider_timeout_ms: 120_000,
            tool_timeout_ms: 120_000,
            typing_interval_ms: 4_000,
            retry_attempts: 4,
            retry_initial_backoff_ms: 1_000,
            retry_max_backoff_ms: 30_000,
            tool_progress: false,
            tool_progress_gap_ms: 2_000,
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `PARLEY_*` environment variables (loads `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok());
        config
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Load a TOML file, then overlay environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let _ = dotenvy::dotenv();
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a key lookup. Unparseable values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(model) = get("MODEL").or_else(|| lookup("CLAUDE_MODEL")) {
            self.model = crate::models::resolve_model(&model);
        }
        if let Some(prompt) = get("SYSTEM_PROMPT").or_else(|| lookup("SYSTEM_PROMPT")) {
            self.system_prompt = prompt;
        }
        if let Some(dir) = get("DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = get("TOOL_PROGRESS") {
            self.tool_progress = matches!(flag.as_str(), "1" | "true" | "yes" | "on");
        }

        set_positive(&mut self.max_tokens, get("MAX_TOKENS"));
        set_positive(&mut self.max_rounds, get("MAX_ROUNDS"));
        set_positive(&mut self.throttle_interval_ms, get("THROTTLE_MS"));
        set_positive(&mut self.max_message_len, get("MAX_MESSAGE_LEN"));
        set_positive(&mut self.max_tool_result_chars, get("MAX_TOOL_RESULT_CHARS"));
        set_positive(&mut self.max_history_block_chars, get("MAX_HISTORY_BLOCK_CHARS"));
        set_positive(&mut self.image_retention_turns, get("IMAGE_RETENTION_TURNS"));
        set_positive(&mut self.max_history_turns, get("MAX_HISTORY_TURNS"));
        set_positive(&mut self.provider_timeout_ms, get("PROVIDER_TIMEOUT_MS"));
        set_positive(&mut self.tool_timeout_ms, get("TOOL_TIMEOUT_MS"));
        set_positive(&mut self.typing_interval_ms, get("TYPING_INTERVAL_MS"));
        set_positive(&mut self.retry_attempts, get("RETRY_ATTEMPTS"));
        if let Some(threshold) = get("SPLIT_THRESHOLD").and_then(|v| parse_positive(&v)) {
            self.split_threshold = Some(threshold);
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_rounds == 0 {
            return Err(EngineError::Configuration("max_rounds must be at least 1".into()));
        }
        if self.max_message_len <= FENCE_RESERVE {
            return Err(EngineError::Configuration(format!(
                "max_message_len must exceed {FENCE_RESERVE}"
            )));
        }
        if self.max_history_turns == 0 {
            return Err(EngineError::Configuration(
                "max_history_turns must be at least 1".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(EngineError::Configuration("retry_attempts must be at least 1".into()));
        }
        if self.model.trim().is_empty() {
            return Err(EngineError::Configuration("model must not be empty".into()));
        }
        Ok(())
    }

    /// Effective split threshold, always leaving room for a closing fence.
    pub fn split_threshold(&self) -> usize {
        let ceiling = self.max_message_len.saturating_sub(FENCE_RESERVE).max(1);
        self.split_threshold
            .unwrap_or(self.max_message_len * SPLIT_HEADROOM_PERCENT / 100)
            .clamp(1, ceiling)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_millis(self.typing_interval_ms)
    }

    pub fn tool_progress_gap(&self) -> Duration {
        Duration::from_millis(self.tool_progress_gap_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_initial_backoff_ms),
            max_delay: Duration::from_millis(self.retry_max_backoff_ms),
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings::builder().max_tokens(self.max_tokens).build()
    }

    /// Directory for persisted conversations: `data_dir` or the platform data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "parley")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }
}

fn set_positive<T>(slot: &mut T, value: Option<String>)
where
    T: std::str::FromStr + PartialOrd + Default,
{
    if let Some(parsed) = value.as_deref().and_then(parse_positive) {
        *slot = parsed;
    }
}

fn parse_positive<T>(value: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = value.trim().parse::<T>().ok()?;
    if parsed <= T::default() {
        None
    } else {
        Some(parsed)
    }
}
