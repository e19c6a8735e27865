//! Built-in `update_todos` tool.
//!
//! Unlike registered tools this one mutates per-chat engine state, so the
//! engine applies it directly instead of dispatching it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::schema::ToolSchema;
use crate::error::EngineError;
use crate::provider::ToolDefinition;

pub const UPDATE_TODOS: &str = "update_todos";

/// Progress state of one checklist item.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn marker(self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[~]",
            Self::Completed => "[x]",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoItem {
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
}

/// The checklist the model keeps for a chat. Each update replaces it whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoList {
    pub items: Vec<TodoItem>,
}

#[derive(Deserialize)]
struct UpdateTodosInput {
    todos: Vec<TodoItem>,
}

impl TodoList {
    /// Replace the list from an `update_todos` input and return the rendered
    /// checklist as the tool result.
    pub fn apply(&mut self, input: &serde_json::Value) -> Result<String, EngineError> {
        let parsed: UpdateTodosInput = serde_json::from_value(input.clone()).map_err(|e| {
            EngineError::InvalidArgument(format!("{UPDATE_TODOS} expects {{\"todos\": [...]}}: {e}"))
        })?;
        self.items = parsed
            .todos
            .into_iter()
            .filter(|item| !item.content.trim().is_empty())
            .collect();
        Ok(self.render())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One line per item, e.g. `[~] write tests`.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "Checklist is empty.".to_string();
        }
        self.items
            .iter()
            .map(|item| format!("{} {}", item.status.marker(), item.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn definition() -> ToolDefinition {
        let item = serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "What needs doing" },
                "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
            },
            "required": ["content", "status"]
        });
        ToolDefinition {
            name: UPDATE_TODOS.to_string(),
            description: "Replace the task checklist for this conversation. Send the full list every time."
                .to_string(),
            input_schema: ToolSchema::object()
                .array("todos", "Complete checklist, in order", item, true)
                .build()
                .schema,
        }
    }
}
