//! Outcome types for one `process` call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one processed user message.
pub type RunId = Uuid;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Canceled,
    RoundLimit,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Provider rounds started.
    pub rounds: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    fn new(run_id: RunId, status: RunStatus, rounds: usize) -> Self {
        Self {
            run_id,
            status,
            rounds,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn completed(run_id: RunId, rounds: usize) -> Self {
        Self::new(run_id, RunStatus::Completed, rounds)
    }

    pub fn canceled(run_id: RunId, rounds: usize) -> Self {
        Self::new(run_id, RunStatus::Canceled, rounds)
    }

    pub fn round_limit(run_id: RunId, rounds: usize) -> Self {
        Self::new(run_id, RunStatus::RoundLimit, rounds)
    }

    pub fn failed(run_id: RunId, rounds: usize, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(run_id, RunStatus::Failed, rounds)
        }
    }
}
