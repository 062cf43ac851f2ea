//! Checkpointer trait and an in-memory implementation.
//!
//! A checkpoint is the full [`ConversationState`] of one thread, stored under
//! its thread id and overwritten on every save.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationState;

/// Error type for checkpoint operations
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("thread_id required")]
    ThreadIdRequired,
    #[error("checkpoint serialization: {0}")]
    Serialization(String),
    #[error("checkpoint storage: {0}")]
    Storage(String),
    #[error("checkpoint not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::Storage(e.to_string())
    }
}

/// One persisted thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub updated_at: DateTime<Utc>,
    pub state: ConversationState,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: ConversationState) -> Self {
        Self {
            thread_id: thread_id.into(),
            updated_at: Utc::now(),
            state,
        }
    }

    pub fn info(&self) -> CheckpointInfo {
        CheckpointInfo {
            thread_id: self.thread_id.clone(),
            updated_at: self.updated_at,
            message_count: self.state.len(),
        }
    }
}

/// Summary of a stored thread, for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub thread_id: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl CheckpointInfo {
    /// Local time, for display
    pub fn updated_at_display(&self) -> String {
        self.updated_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

/// Saves and loads conversation state by thread id.
///
/// Implementations: [`MemoryCheckpointer`] here, a file-backed one in the CLI.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Store the state for `thread_id`, replacing any earlier checkpoint
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError>;

    /// Latest state for `thread_id`, or `None` if the thread was never saved
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError>;

    /// All stored threads, most recently updated first
    async fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError>;

    /// Remove a thread. Deleting an unknown thread is `NotFound`.
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
}

/// Reject blank thread ids
pub fn require_thread_id(thread_id: &str) -> Result<(), CheckpointError> {
    if thread_id.trim().is_empty() {
        return Err(CheckpointError::ThreadIdRequired);
    }
    Ok(())
}

/// Process-local checkpointer; contents are lost on exit
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        require_thread_id(thread_id)?;
        self.threads
            .lock()
            .insert(thread_id.to_string(), Checkpoint::new(thread_id, state.clone()));
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError> {
        require_thread_id(thread_id)?;
        Ok(self.threads.lock().get(thread_id).map(|c| c.state.clone()))
    }

    async fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut infos: Vec<CheckpointInfo> = self.threads.lock().values().map(Checkpoint::info).collect();
        infos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(infos)
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        require_thread_id(thread_id)?;
        match self.threads.lock().remove(thread_id) {
            Some(_) => Ok(()),
            None => Err(CheckpointError::NotFound(thread_id.to_string())),
        }
    }
}
