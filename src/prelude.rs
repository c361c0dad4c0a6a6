//! Commonly used types, re-exported for convenient glob import.

pub use crate::config::SableConfig;
pub use crate::conversation::{ConversationEntry, ConversationStore, InMemoryConversation};
pub use crate::error::{ErrorKind, RecoveryTracker, Result, SableError};
pub use crate::parser::AssistantMessageParser;
pub use crate::permission::{AllowAll, DenyAll, PermissionGate, PermissionRequest};
pub use crate::task::{
    EventSink, Task, TaskEvent, TaskEventPayload, TaskHandle, TaskOutcome, TaskRequest, TaskState,
};
pub use crate::tools::{
    AgentTool, ParamType, Tool, ToolExecutor, ToolParameter, ToolParams, ToolRegistry,
    COMPLETION_TOOL,
};
pub use crate::transport::{OpenAiChatTransport, Transport, TransportEvent};
pub use crate::types::{
    ContentBlock, HistoryContent, HistoryItem, Role, TokenUsage, ToolResult, ToolUse,
};
