//! Task-side collaborator traits: project context and file-change tracking.

use async_trait::async_trait;

use crate::error::SableError;

/// Supplies ambient project information for the first user message.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Format the raw user message with whatever context the editor wants
    /// the model to see (open files, workspace layout, diagnostics).
    async fn format_user_message(&self, message: &str) -> Result<String, SableError>;
}

/// Context provider that passes the message through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn format_user_message(&self, message: &str) -> Result<String, SableError> {
        Ok(message.to_string())
    }
}

/// Tracks file changes made during a task and produces an aggregate diff.
#[async_trait]
pub trait DiffTracker: Send + Sync {
    /// Detach tracking and return the aggregate diff, if any changes were
    /// recorded. Called exactly once, at task completion.
    async fn finalize(&self) -> Option<String>;
}

/// Diff tracker that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiffTracker;

#[async_trait]
impl DiffTracker for NoDiffTracker {
    async fn finalize(&self) -> Option<String> {
        None
    }
}
