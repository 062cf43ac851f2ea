//! Error types for cadence-agent

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Result type alias using cadence-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Ways a turn can end without an output step
#[derive(Error, Debug)]
pub enum Error {
    /// The model answered with something outside the step protocol
    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String },

    /// The model asked for a tool that is not registered
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// The turn used up its model call budget without reaching `output`
    #[error("No output step after {limit} model calls")]
    NonTerminating { limit: u32 },

    /// Transport or auth failure talking to the model
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] cadence_ai::Error),

    /// Persisting or restoring a thread failed
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Controller configuration is unusable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Short machine-friendly kind, used in events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedResponse { .. } => "malformed_response",
            Error::UnknownTool { .. } => "unknown_tool",
            Error::NonTerminating { .. } => "non_terminating",
            Error::ModelUnavailable(_) => "model_unavailable",
            Error::Checkpoint(_) => "checkpoint",
            Error::InvalidConfig(_) => "invalid_config",
        }
    }
}
