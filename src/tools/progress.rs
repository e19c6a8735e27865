//! Short progress lines announcing tool calls to the user.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::types::ToolCall;

/// Format a tool call as a short human-readable line, or `None` when there is
/// nothing useful to show.
pub fn format_tool_progress(call: &ToolCall) -> Option<String> {
    let input = &call.input;
    let field = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|key| input.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let line = match call.name.as_str() {
        "read_file" | "get_file" | "Read" => format!("Reading {}", short_path(&field(&["path", "file_path"])?)),
        "write_file" | "Write" => format!("Writing {}", short_path(&field(&["path", "file_path"])?)),
        "edit_file" | "Edit" => format!("Editing {}", short_path(&field(&["path", "file_path"])?)),
        "run_command" | "Bash" => {
            let command = field(&["command"])?;
            let first = command.lines().next().unwrap_or_default();
            format!("$ {}", first.chars().take(80).collect::<String>())
        }
        "web_search" | "search" | "Grep" => {
            let query = field(&["query", "pattern"])?;
            format!("Searching: {}", query.chars().take(60).collect::<String>())
        }
        "" => return None,
        other => title_case(other),
    };
    Some(line)
}

/// Keep the last three components of a long path.
fn short_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    if parts.len() > 3 {
        parts[parts.len() - 3..].join("/")
    } else {
        path.to_string()
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Numbers tool calls within one run and rate-limits the lines sent.
#[derive(Debug)]
pub struct ProgressTracker {
    count: usize,
    last_sent: Option<Instant>,
    min_gap: Duration,
}

impl ProgressTracker {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            count: 0,
            last_sent: None,
            min_gap,
        }
    }

    /// Count `call` and return the line to send, if one is due.
    pub fn observe(&mut self, call: &ToolCall) -> Option<String> {
        self.count += 1;
        let now = Instant::now();
        if let Some(last) = self.last_sent {
            if now.duration_since(last) < self.min_gap {
                return None;
            }
        }
        let line = format_tool_progress(call)?;
        self.last_sent = Some(now);
        Some(format!("[{}] {line}", self.count))
    }
}
