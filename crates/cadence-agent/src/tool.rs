//! Tool trait, registry and observations

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure inside a tool. Never ends a turn: the controller turns it into
/// an error observation the model can react to.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The underlying operation failed (non-zero exit, network error, ...)
    #[error("{0}")]
    Failed(String),

    /// A policy or the user refused the invocation
    #[error("Denied: {0}")]
    Denied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for tools the model can call with a single string input
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (what the model puts in `tool_name`)
    fn name(&self) -> &str;

    /// Tool description for the system prompt
    fn description(&self) -> &str;

    /// What the single string input means, e.g. "city"
    fn input_hint(&self) -> &str {
        "input"
    }

    /// Run the tool. `call_id` correlates the observation with the action.
    async fn invoke(&self, input: &str, call_id: &str) -> Result<String, ToolError>;
}

/// Type alias for a shared tool
pub type BoxedTool = Arc<dyn Tool>;

/// One tool call the controller is about to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub tool_input: String,
    pub tool_call_id: String,
}

/// Text fed back to the model after a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub content: String,
    pub is_error: bool,
}

impl Observation {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<Result<String, ToolError>> for Observation {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(text) => Observation::text(text),
            Err(e) => Observation::error(format!("Error: {}", e)),
        }
    }
}

/// Named tools, in registration order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    /// Returns the replaced tool, if there was one.
    pub fn register(&mut self, tool: BoxedTool) -> Option<BoxedTool> {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            tracing::warn!("Tool '{}' registered twice, replacing", tool.name());
            return Some(std::mem::replace(slot, tool));
        }
        self.tools.push(tool);
        None
    }

    /// Builder-style register
    pub fn with(mut self, tool: BoxedTool) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxedTool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
