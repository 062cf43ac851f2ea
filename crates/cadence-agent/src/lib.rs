//! cadence-agent: the plan/action/observe turn controller
//!
//! This crate drives one user turn from the first model call to a terminal
//! step: it routes on the step the model reports, dispatches tool calls,
//! feeds observations back, and enforces the per-turn model call bound.

pub mod agent;
pub mod checkpoint;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod events;
pub mod router;
pub mod tool;

pub use agent::Agent;
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointInfo, Checkpointer, MemoryCheckpointer, require_thread_id,
};
pub use controller::{AgentConfig, TurnController};
pub use conversation::ConversationState;
pub use error::{Error, Result};
pub use events::AgentEvent;
pub use router::{Route, route};
pub use tool::{BoxedTool, Observation, Tool, ToolError, ToolInvocation, ToolRegistry};
