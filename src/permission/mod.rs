//! Permission gate collaborator.
//!
//! The executor builds a [`PermissionRequest`] for any tool marked as
//! requiring permission and asks the gate before running it. How the gate
//! answers (user prompt, policy file, always-allow) is outside the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SableError;
use crate::tools::{Tool, ToolParams};

/// Parameter names conventionally holding the operation target, in
/// preference order.
const TARGET_PARAMS: &[&str] = &["path", "file_path", "command", "directory", "pattern", "query"];

/// Maximum bytes of content shown in a permission prompt.
const DETAILS_PREVIEW_BYTES: usize = 200;

/// Kind of operation a tool performs, inferred from its name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Write,
    Delete,
    Execute,
    Other,
}

impl OperationKind {
    /// Infer from tool-name keywords.
    pub fn infer(tool_name: &str) -> Self {
        let lower = tool_name.to_lowercase();
        if lower.contains("delete") || lower.contains("remove") {
            OperationKind::Delete
        } else if lower.contains("write") || lower.contains("edit") || lower.contains("create") {
            OperationKind::Write
        } else if lower.contains("exec") || lower.contains("command") || lower.contains("run") {
            OperationKind::Execute
        } else if lower.contains("read") || lower.contains("list") || lower.contains("search") {
            OperationKind::Read
        } else {
            OperationKind::Other
        }
    }
}

/// Descriptor of an operation awaiting authorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRequest {
    pub tool_name: String,
    pub operation: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub details: String,
}

impl PermissionRequest {
    /// Build a request from a tool and its raw parameters.
    pub fn for_tool(tool: &dyn Tool, params: &ToolParams) -> Self {
        let target = TARGET_PARAMS
            .iter()
            .find_map(|name| params.get(name))
            .map(str::to_string);

        let details = match params.get("content") {
            Some(content) => {
                let preview = truncate_utf8(content, DETAILS_PREVIEW_BYTES);
                if preview.len() < content.len() {
                    format!("content preview: {preview}…")
                } else {
                    format!("content: {preview}")
                }
            }
            None => {
                let mut pairs: Vec<String> = params
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                pairs.sort();
                pairs.join(", ")
            }
        };

        Self {
            tool_name: tool.name().to_string(),
            operation: OperationKind::infer(tool.name()),
            target,
            details,
        }
    }
}

/// Authorization collaborator. A denial is not an error; gate failures are.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check_permission(&self, request: &PermissionRequest) -> Result<bool, SableError>;
}

/// Gate that approves everything. Useful for tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionGate for AllowAll {
    async fn check_permission(&self, _request: &PermissionRequest) -> Result<bool, SableError> {
        Ok(true)
    }
}

/// Gate that denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl PermissionGate for DenyAll {
    async fn check_permission(&self, _request: &PermissionRequest) -> Result<bool, SableError> {
        Ok(false)
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    &s[..cutoff]
}
