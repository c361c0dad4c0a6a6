//! Core data types shared across the crate.

pub mod content;
pub mod message;
pub mod usage;

pub use content::{ContentBlock, ToolResult, ToolUse};
pub use message::{normalize_for_transport, HistoryContent, HistoryItem, Role};
pub use usage::TokenUsage;
