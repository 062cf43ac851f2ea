//! Turn event types

use cadence_ai::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted while a turn runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A user message was accepted and the turn started
    TurnStart { user_message: String },

    /// The model is about to be called (1-based within the turn)
    ModelCall { call_number: u32 },

    /// The model reported a plan step
    Plan { content: String },

    /// The model reported an observe step
    Observe { content: String },

    /// Tool execution started
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        input: String,
    },

    /// Tool execution completed
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        observation: String,
        is_error: bool,
    },

    /// The model reached the output step
    Output { content: String },

    /// The turn finished successfully
    TurnEnd { model_calls: u32, usage: Usage },

    /// The turn ended with an error
    Error { kind: String, message: String },
}

impl AgentEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::TurnEnd { .. } | AgentEvent::Error { .. })
    }
}
