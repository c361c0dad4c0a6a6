//! Conversation history items and transport normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::ToolResult;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a tool execution. The transport speaks only
    /// user/assistant/system; these items are reclassified before sending.
    ToolResult,
}

/// One entry in a task's append-only history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryItem {
    pub role: Role,
    pub content: HistoryContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// History item payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HistoryContent {
    Text(String),
    ToolResult(ToolResult),
}

impl HistoryItem {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: HistoryContent::Text(text.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: HistoryContent::Text(text.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: HistoryContent::Text(text.into()),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::ToolResult,
            content: HistoryContent::ToolResult(result),
            timestamp: Some(Utc::now()),
        }
    }

    /// The textual content, rendering tool results into their wire form.
    pub fn text(&self) -> String {
        match &self.content {
            HistoryContent::Text(text) => text.clone(),
            HistoryContent::ToolResult(result) => render_tool_result(result),
        }
    }
}

/// Render a tool result into the string form the model sees.
fn render_tool_result(result: &ToolResult) -> String {
    if result.is_error {
        format!("[{}] Error: {}", result.tool_name, result.content)
    } else {
        format!("[{}] Result:\n{}", result.tool_name, result.content)
    }
}

/// Reclassify `tool_result` items as formatted `user` messages.
///
/// The transport contract covers only user/assistant/system roles, so tool
/// results re-enter the model's context as user-authored text.
pub fn normalize_for_transport(history: &[HistoryItem]) -> Vec<HistoryItem> {
    history
        .iter()
        .map(|item| match item.role {
            Role::ToolResult => HistoryItem {
                role: Role::User,
                content: HistoryContent::Text(item.text()),
                timestamp: item.timestamp,
            },
            _ => item.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_items_become_user_text() {
        let history = vec![
            HistoryItem::user("do the thing"),
            HistoryItem::assistant("<read_file><path>a.txt</path></read_file>"),
            HistoryItem::tool_result(ToolResult::success("read_file", "contents")),
        ];

        let normalized = normalize_for_transport(&history);

        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[2].role, Role::User);
        let text = normalized[2].text();
        assert!(text.contains("[read_file]"));
        assert!(text.contains("contents"));
    }

    #[test]
    fn error_results_render_with_error_marker() {
        let item = HistoryItem::tool_result(ToolResult::error("write_file", "denied"));
        assert!(item.text().contains("Error: denied"));
    }

    #[test]
    fn non_tool_items_pass_through_unchanged() {
        let history = vec![HistoryItem::user("hi"), HistoryItem::assistant("hello")];
        let normalized = normalize_for_transport(&history);
        assert_eq!(normalized, history);
    }
}
