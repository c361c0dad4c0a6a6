//! Ordered tool registry.
//!
//! Registration order is significant: it fixes the parser's tag-matching
//! tie-break order and the order tools are listed in error messages.

use std::sync::Arc;

use crate::parser::{dedup_names, RAW_CONTENT_PARAM};

use super::tool::Tool;

/// Named tool collection. Snapshot its vocabularies per turn when building
/// a parser; the registry itself is immutable after construction.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Tool names in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Names of tools declaring a raw `content` parameter. These get the
    /// parser's substring re-extraction on tool close.
    pub fn raw_content_tools(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|t| t.parameters().iter().any(|p| p.name == RAW_CONTENT_PARAM))
            .map(|t| t.name().to_string())
            .collect()
    }

    /// All declared parameter names across tools, first-seen order, deduped.
    pub fn param_names(&self) -> Vec<String> {
        dedup_names(
            self.tools
                .iter()
                .flat_map(|t| t.parameters().iter().map(|p| p.name.clone())),
        )
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
