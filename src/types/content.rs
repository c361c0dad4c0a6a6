//! Parsed assistant-message content and tool execution results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A block of parsed assistant output.
///
/// Produced only by the [`AssistantMessageParser`](crate::parser::AssistantMessageParser);
/// ownership passes to the agent loop once the parser is finalized. At most
/// one block is `partial` at any time — the most recently opened one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { content: String, partial: bool },
    ToolUse(ToolUse),
}

impl ContentBlock {
    /// Whether this block is still being written to by the parser.
    pub fn is_partial(&self) -> bool {
        match self {
            ContentBlock::Text { partial, .. } => *partial,
            ContentBlock::ToolUse(tool) => tool.partial,
        }
    }
}

/// A tool invocation parsed out of the assistant stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUse {
    pub name: String,
    /// Raw parameter values in the order they closed. Values for the block
    /// currently being parsed may still be accumulating.
    pub params: HashMap<String, String>,
    /// Assigned lazily the first time the loop needs to correlate this call
    /// with its eventual result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub partial: bool,
}

impl ToolUse {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: HashMap::new(),
            id: None,
            partial: true,
        }
    }

    /// Assign an id if none exists yet, returning it.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_none() {
            self.id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.id.as_deref().unwrap_or_default()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Terminal result of one executed tool call. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            content: content.into(),
            is_error: false,
            tool_call_id: None,
        }
    }

    pub fn error(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            content: message.into(),
            is_error: true,
            tool_call_id: None,
        }
    }

    pub fn with_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }
}
