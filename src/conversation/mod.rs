//! Display-side conversation storage.
//!
//! The task keeps two parallel records of an assistant turn: the raw text
//! (with XML tool tags intact) goes into the model-facing history, while the
//! finalized content blocks land here for rendering. A [`ConversationStore`]
//! receives the display-side record; the built-in [`InMemoryConversation`]
//! just accumulates it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SableError;
use crate::types::{ContentBlock, ToolResult};

/// One display-side conversation entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationEntry {
    User {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Finalized assistant turn as parsed content blocks.
    Assistant {
        blocks: Vec<ContentBlock>,
        timestamp: DateTime<Utc>,
    },
    ToolResult {
        result: ToolResult,
        timestamp: DateTime<Utc>,
    },
}

impl ConversationEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self::Assistant {
            blocks,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::ToolResult {
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for display-side conversation records.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, entry: ConversationEntry) -> Result<(), SableError>;

    async fn entries(&self) -> Result<Vec<ConversationEntry>, SableError>;
}

/// In-memory conversation store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConversation {
    entries: Arc<Mutex<Vec<ConversationEntry>>>,
}

impl InMemoryConversation {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversation {
    async fn append(&self, entry: ConversationEntry) -> Result<(), SableError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<ConversationEntry>, SableError> {
        Ok(self.entries.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_accumulate_in_order() {
        let store = InMemoryConversation::new();
        store.append(ConversationEntry::user("hi")).await.unwrap();
        store
            .append(ConversationEntry::tool_result(ToolResult::success(
                "read_file",
                "data",
            )))
            .await
            .unwrap();

        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], ConversationEntry::User { .. }));
        assert!(matches!(entries[1], ConversationEntry::ToolResult { .. }));
    }
}
