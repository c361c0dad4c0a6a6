//! UI-facing event surface emitted by a running task.
//!
//! Events are fire-and-forget: the sink callback returns nothing and the
//! loop never waits on it. Each event carries a monotonically increasing
//! sequence number so a consumer can detect reordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::{TokenUsage, ToolResult, ToolUse};

pub type TaskId = Uuid;

/// Callback used for streaming task events.
pub type EventSink = Arc<dyn Fn(TaskEvent) + Send + Sync>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TaskEventPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEventPayload {
    /// Running assistant display text. `streaming: false` marks the terminal
    /// chunk for the turn.
    StreamChunk { text: String, streaming: bool },
    /// A tool call surfaced to the UI, possibly still partial.
    ToolCall { call: ToolUse },
    ToolResult { result: ToolResult },
    TokenUsage { usage: TokenUsage },
    /// Aggregate file-change diff computed at completion.
    TaskDiff { diff: String },
    /// Terminal signal; emitted exactly once per task.
    TaskComplete,
    Error { message: String },
}

/// Seq-stamping wrapper around an optional sink.
pub struct TaskEventEmitter {
    task_id: TaskId,
    seq: AtomicU64,
    sink: Option<EventSink>,
}

impl TaskEventEmitter {
    pub fn new(task_id: TaskId, sink: Option<EventSink>) -> Self {
        Self {
            task_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub fn emit(&self, payload: TaskEventPayload) {
        let Some(sink) = &self.sink else { return };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TaskEvent {
            task_id: self.task_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}

impl std::fmt::Debug for TaskEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEventEmitter")
            .field("task_id", &self.task_id)
            .field("seq", &self.seq)
            .finish()
    }
}
