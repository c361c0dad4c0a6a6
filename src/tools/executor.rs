//! Tool executor: validate, authorize, execute, normalize.
//!
//! [`ToolExecutor::execute_tool`] never fails — every failure path resolves
//! into a [`ToolResult`] with `is_error: true`, so tool failures re-enter
//! the model's context as information instead of crashing the task.

use std::sync::Arc;

use crate::permission::{PermissionGate, PermissionRequest};
use crate::types::{ToolResult, ToolUse};

use super::registry::ToolRegistry;
use super::tool::{describe_schema, validate_params, ToolParams};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn PermissionGate>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { registry, gate }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one parsed tool call.
    pub async fn execute_tool(&self, call: &ToolUse) -> ToolResult {
        let tool = match self.registry.get(&call.name) {
            Some(tool) => tool,
            None => {
                return ToolResult::error(
                    &call.name,
                    format!(
                        "Unknown tool '{}'. Available tools: {}",
                        call.name,
                        self.registry.tool_names().join(", ")
                    ),
                );
            }
        };

        let params = ToolParams::new(call.params.clone());

        if let Err(violation) = validate_params(tool.parameters(), &params) {
            return ToolResult::error(
                &call.name,
                format!(
                    "Invalid parameters: {violation}. Expected: {}",
                    describe_schema(tool.parameters())
                ),
            );
        }

        if tool.requires_permission() {
            let request = PermissionRequest::for_tool(tool.as_ref(), &params);
            match self.gate.check_permission(&request).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(tool = %call.name, "permission denied");
                    return ToolResult::error(
                        &call.name,
                        format!("Permission denied for tool '{}'", call.name),
                    );
                }
                Err(err) => {
                    return ToolResult::error(&call.name, err.user_message());
                }
            }
        }

        tracing::debug!(tool = %call.name, "executing tool");
        match tool.execute(&params).await {
            Ok(output) => ToolResult::success(&call.name, output),
            Err(err) => {
                // History carries the user-facing message, never a raw trace.
                tracing::debug!(tool = %call.name, error = %err, "tool failed");
                ToolResult::error(&call.name, err.user_message())
            }
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SableError;
    use crate::permission::{AllowAll, DenyAll};
    use crate::tools::tool::{AgentTool, ParamType, Tool, ToolParameter};
    use std::collections::HashMap;

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(AgentTool::new(
            "echo",
            "Echo back the message",
            vec![ToolParameter::required(
                "message",
                ParamType::String,
                "Text to echo",
            )],
            |params| async move {
                Ok(params.require("echo", "message")?.to_string())
            },
        ))
    }

    fn failing_tool() -> Arc<dyn Tool> {
        Arc::new(AgentTool::new("boom", "Always fails", vec![], |_| async {
            Err(SableError::ToolExecution {
                tool_name: "boom".into(),
                message: "it broke".into(),
            })
        }))
    }

    fn gated_tool() -> Arc<dyn Tool> {
        Arc::new(
            AgentTool::new(
                "write_file",
                "Write a file",
                vec![
                    ToolParameter::required("path", ParamType::String, "Path"),
                    ToolParameter::required("content", ParamType::String, "Content"),
                ],
                |_| async { Ok("written".into()) },
            )
            .with_permission(),
        )
    }

    fn call(name: &str, pairs: &[(&str, &str)]) -> ToolUse {
        let mut tool_use = ToolUse::new(name);
        tool_use.params = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        tool_use.partial = false;
        tool_use
    }

    fn executor(
        tools: Vec<Arc<dyn Tool>>,
        gate: Arc<dyn crate::permission::PermissionGate>,
    ) -> ToolExecutor {
        ToolExecutor::new(Arc::new(ToolRegistry::new(tools)), gate)
    }

    #[tokio::test]
    async fn unknown_tool_lists_available_names() {
        let exec = executor(vec![echo_tool()], Arc::new(AllowAll));
        let result = exec.execute_tool(&call("nope", &[])).await;
        assert!(result.is_error);
        assert!(result.content.contains("Unknown tool 'nope'"));
        assert!(result.content.contains("echo"));
    }

    #[tokio::test]
    async fn validation_failure_echoes_schema() {
        let exec = executor(vec![echo_tool()], Arc::new(AllowAll));
        let result = exec.execute_tool(&call("echo", &[])).await;
        assert!(result.is_error);
        assert!(result.content.contains("message (string, required)"));
    }

    #[tokio::test]
    async fn successful_execution_wraps_output() {
        let exec = executor(vec![echo_tool()], Arc::new(AllowAll));
        let result = exec.execute_tool(&call("echo", &[("message", "hi")])).await;
        assert!(!result.is_error);
        assert_eq!(result.content, "hi");
        assert_eq!(result.tool_name, "echo");
    }

    #[tokio::test]
    async fn execution_error_is_sanitized() {
        let exec = executor(vec![failing_tool()], Arc::new(AllowAll));
        let result = exec.execute_tool(&call("boom", &[])).await;
        assert!(result.is_error);
        assert!(result.content.contains("tool failed"));
    }

    #[tokio::test]
    async fn permission_denial_short_circuits() {
        let exec = executor(vec![gated_tool()], Arc::new(DenyAll));
        let result = exec
            .execute_tool(&call("write_file", &[("path", "a"), ("content", "b")]))
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Permission denied"));
    }

    #[tokio::test]
    async fn permission_grant_allows_execution() {
        let exec = executor(vec![gated_tool()], Arc::new(AllowAll));
        let result = exec
            .execute_tool(&call("write_file", &[("path", "a"), ("content", "b")]))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "written");
    }
}
