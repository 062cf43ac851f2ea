//! Model client implementations

pub mod openai;

use crate::{Completion, CompletionRequest, Result};
use async_trait::async_trait;

/// A chat model that answers a history with one step object
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Request one completion for the given history
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

