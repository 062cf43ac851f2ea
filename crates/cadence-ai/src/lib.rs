//! cadence-ai: chat model client layer
//!
//! This crate owns everything on the model side of the turn loop: the
//! conversation message types, the enumerated step schema the model must
//! answer with, and an OpenAI-compatible Chat Completions client.

pub mod error;
pub mod models;
pub mod providers;
pub mod step;
pub mod types;

pub use error::{Error, Result};
pub use providers::ModelClient;
pub use step::{Step, StepError, StructuredOutput, WireOutput};
pub use types::*;
