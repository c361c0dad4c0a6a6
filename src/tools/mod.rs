//! Tool system: trait, registry, executor, and builtin coding tools.

pub mod builtin;
pub mod executor;
pub mod registry;
pub mod tool;

pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use tool::{AgentTool, ParamType, Tool, ToolParameter, ToolParams};

/// Reserved tool name whose invocation ends a task successfully.
pub const COMPLETION_TOOL: &str = "attempt_completion";
