//! Tests for the tool system.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use parley::error::EngineError;
use parley::tools::*;
use parley::types::ToolCall;

/// A trait-implemented tool, as an embedding application would write one.
struct WordCount {
    schema: ToolSchema,
}

impl WordCount {
    fn new() -> Self {
        Self {
            schema: ToolSchema::object()
                .string("text", "Text to count", true)
                .build(),
        }
    }
}

#[async_trait]
impl Tool for WordCount {
    fn name(&self) -> &str {
        "word_count"
    }

    fn description(&self) -> &str {
        "Count the words in a text"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(
        &self,
        input: &serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<String, EngineError> {
        let text = input["text"]
            .as_str()
            .ok_or_else(|| EngineError::ToolExecution {
                tool_name: "word_count".into(),
                message: "missing 'text'".into(),
            })?;
        Ok(text.split_whitespace().count().to_string())
    }
}

fn call(name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall {
        id: "call_1".into(),
        name: name.into(),
        input,
    }
}

#[test]
fn schema_builder_constructs_object_schema() {
    let schema = ToolSchema::object()
        .string("query", "Search query", true)
        .integer("limit", "Max results", false)
        .boolean("verbose", "Enable verbose output", false)
        .string_enum("format", "Output format", &["json", "text"], false)
        .build();

    assert_eq!(schema.schema["type"], "object");
    assert_eq!(schema.schema["properties"]["query"]["type"], "string");
    assert_eq!(schema.schema["properties"]["limit"]["type"], "integer");
    assert_eq!(
        schema.schema["properties"]["format"]["enum"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    assert_eq!(schema.schema["required"], json!(["query"]));
}

#[tokio::test]
async fn trait_tools_dispatch_through_the_registry() {
    let mut registry = ToolRegistry::new(Duration::from_secs(5));
    registry.register(Arc::new(WordCount::new()));
    let ctx = ToolContext::default();

    let ok = registry
        .dispatch(&call("word_count", json!({ "text": "one two three" })), &ctx)
        .await;
    assert_eq!(ok, ToolOutcome::Success("3".into()));

    let bad = registry
        .dispatch(&call("word_count", json!({})), &ctx)
        .await;
    assert!(bad.is_error());
    assert_eq!(bad.text(), "Tool error: missing 'text'");
}

#[test]
fn definitions_expose_schema_and_description() {
    let registry = ToolRegistry::new(Duration::from_secs(5)).with_tool(WordCount::new());

    let defs = registry.definitions();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].name, "word_count");
    assert_eq!(defs[0].description, "Count the words in a text");
    assert_eq!(defs[0].input_schema["required"], json!(["text"]));
    assert!(registry.contains("word_count"));
    assert!(!registry.contains("update_todos"));
}

#[tokio::test(start_paused = true)]
async fn hung_tool_is_abandoned_after_the_timeout() {
    let registry = ToolRegistry::new(Duration::from_secs(2)).with_tool(FnTool::new(
        "hang",
        "Never returns",
        ToolSchema::empty(),
        |_input, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, EngineError>("unreachable".to_string())
        },
    ));

    let outcome = registry
        .dispatch(&call("hang", json!({})), &ToolContext::default())
        .await;

    assert_eq!(
        outcome,
        ToolOutcome::Error("Tool error: hang timed out after 2s".into())
    );
}

#[test]
fn checklist_definition_matches_its_input_shape() {
    let def = TodoList::definition();
    assert_eq!(def.name, UPDATE_TODOS);

    let mut list = TodoList::default();
    let rendered = list
        .apply(&json!({ "todos": [{ "content": "ship it", "status": "pending" }] }))
        .unwrap();
    assert_eq!(rendered, "[ ] ship it");
}

#[test]
fn progress_lines_summarize_calls() {
    let line = format_tool_progress(&call("run_command", json!({ "command": "cargo test\necho done" })));
    assert_eq!(line.as_deref(), Some("$ cargo test"));

    let line = format_tool_progress(&call("list_branches", json!({})));
    assert_eq!(line.as_deref(), Some("List Branches"));
}
