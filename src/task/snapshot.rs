//! Material-change detection for partial tool-call publishing.
//!
//! Streaming drives the parser once per chunk, but most chunks change a
//! tool call only by a handful of bytes. Snapshots compare name, partial
//! flag, the parameter key set, and bucketed per-parameter sizes, so the
//! loop re-publishes a call only when the UI would actually show something
//! different.

use crate::types::ToolUse;

/// Parameter value sizes are compared at this granularity.
pub const PARAM_SIZE_BUCKET_BYTES: usize = 64;

/// Published shape of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallSnapshot {
    name: String,
    partial: bool,
    /// Sorted (param name, bucketed value size) pairs.
    params: Vec<(String, usize)>,
}

impl ToolCallSnapshot {
    pub fn of(tool: &ToolUse) -> Self {
        let mut params: Vec<(String, usize)> = tool
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.len() / PARAM_SIZE_BUCKET_BYTES))
            .collect();
        params.sort();
        Self {
            name: tool.name.clone(),
            partial: tool.partial,
            params,
        }
    }
}
