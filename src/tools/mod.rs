//! Tool system: the tool trait, the dispatch registry and built-in helpers.

pub mod progress;
pub mod registry;
pub mod schema;
pub mod todo;
pub mod tool;

pub use progress::{format_tool_progress, ProgressTracker};
pub use registry::{ToolOutcome, ToolRegistry};
pub use schema::{SchemaBuilder, ToolSchema};
pub use todo::{TodoItem, TodoList, TodoStatus, UPDATE_TODOS};
pub use tool::{FnTool, Tool, ToolContext};
