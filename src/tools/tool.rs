//! Tool trait and closure-based tool wrapper.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SableError;

/// Declared type of a tool parameter.
///
/// Values arrive as raw strings from the stream parser; typed parameters
/// are validated by parseability (arrays as JSON arrays).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        }
    }

    /// Whether a raw string value satisfies this type.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            ParamType::String => true,
            ParamType::Number => value.trim().parse::<f64>().is_ok(),
            ParamType::Boolean => matches!(value.trim(), "true" | "false"),
            ParamType::Array => serde_json::from_str::<Vec<serde_json::Value>>(value).is_ok(),
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
        }
    }
}

/// Raw parameter values handed to a tool, as parsed from the stream.
#[derive(Debug, Clone, Default)]
pub struct ToolParams {
    values: HashMap<String, String>,
}

impl ToolParams {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Fetch a required parameter, erroring with the tool's name on absence.
    pub fn require(&self, tool_name: &str, name: &str) -> Result<&str, SableError> {
        self.get(name).ok_or_else(|| SableError::ToolExecution {
            tool_name: tool_name.to_string(),
            message: format!("missing required parameter '{name}'"),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }
}

impl From<HashMap<String, String>> for ToolParams {
    fn from(values: HashMap<String, String>) -> Self {
        Self::new(values)
    }
}

/// Core tool trait — implement to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (the XML tag the model emits).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Declared parameters.
    fn parameters(&self) -> &[ToolParameter];

    /// Whether invoking this tool requires user permission.
    fn requires_permission(&self) -> bool {
        false
    }

    /// Validate raw parameters against the declaration.
    fn validate(&self, params: &ToolParams) -> bool {
        validate_params(self.parameters(), params).is_ok()
    }

    /// Execute the tool with validated parameters.
    async fn execute(&self, params: &ToolParams) -> Result<String, SableError>;
}

/// Check required presence and declared-type parseability.
pub fn validate_params(declared: &[ToolParameter], params: &ToolParams) -> Result<(), String> {
    for decl in declared {
        match params.get(&decl.name) {
            None if decl.required => {
                return Err(format!("missing required parameter '{}'", decl.name));
            }
            Some(value) if !decl.param_type.accepts(value) => {
                return Err(format!(
                    "parameter '{}' expected type '{}'",
                    decl.name,
                    decl.param_type.as_str()
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Render a parameter declaration for error messages.
pub fn describe_schema(declared: &[ToolParameter]) -> String {
    declared
        .iter()
        .map(|p| {
            format!(
                "{} ({}{})",
                p.name,
                p.param_type.as_str(),
                if p.required { ", required" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Type alias for the tool handler function.
type ToolHandler = dyn Fn(ToolParams) -> Pin<Box<dyn Future<Output = Result<String, SableError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    requires_permission: bool,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, SableError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            requires_permission: false,
            handler: Arc::new(move |params| Box::pin(handler(params))),
        }
    }

    /// Mark this tool as requiring permission before execution.
    pub fn with_permission(mut self) -> Self {
        self.requires_permission = true;
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    fn requires_permission(&self) -> bool {
        self.requires_permission
    }

    async fn execute(&self, params: &ToolParams) -> Result<String, SableError> {
        (self.handler)(params.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("requires_permission", &self.requires_permission)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ToolParams {
        ToolParams::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn validate_rejects_missing_required() {
        let declared = vec![ToolParameter::required(
            "path",
            ParamType::String,
            "File path",
        )];
        let err = validate_params(&declared, &params(&[])).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn validate_checks_declared_types() {
        let declared = vec![ToolParameter::required("limit", ParamType::Number, "Cap")];
        assert!(validate_params(&declared, &params(&[("limit", "42")])).is_ok());
        assert!(validate_params(&declared, &params(&[("limit", "many")])).is_err());

        let declared = vec![ToolParameter::optional("flags", ParamType::Array, "Flags")];
        assert!(validate_params(&declared, &params(&[("flags", "[\"a\"]")])).is_ok());
        assert!(validate_params(&declared, &params(&[("flags", "a,b")])).is_err());
    }

    #[test]
    fn optional_params_may_be_absent() {
        let declared = vec![ToolParameter::optional(
            "verbose",
            ParamType::Boolean,
            "Verbosity",
        )];
        assert!(validate_params(&declared, &params(&[])).is_ok());
    }

    #[tokio::test]
    async fn agent_tool_executes_handler() {
        let tool = AgentTool::new(
            "greet",
            "Greet a person",
            vec![ToolParameter::required("name", ParamType::String, "Name")],
            |params| async move {
                let name = params.require("greet", "name")?.to_string();
                Ok(format!("Hello, {name}!"))
            },
        );

        let out = tool.execute(&params(&[("name", "Ada")])).await.unwrap();
        assert_eq!(out, "Hello, Ada!");

        let err = tool.execute(&params(&[])).await.unwrap_err();
        assert!(matches!(err, SableError::ToolExecution { .. }));
    }

    #[test]
    fn schema_description_lists_all_params() {
        let declared = vec![
            ToolParameter::required("path", ParamType::String, "File path"),
            ToolParameter::optional("limit", ParamType::Number, "Cap"),
        ];
        let desc = describe_schema(&declared);
        assert_eq!(desc, "path (string, required), limit (number)");
    }
}
