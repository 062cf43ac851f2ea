//! A single checkpointed conversation on top of a shared controller

use std::sync::Arc;

use cadence_ai::Message;

use crate::{
    checkpoint::Checkpointer,
    controller::TurnController,
    conversation::ConversationState,
    error::{Error, Result},
};

/// One conversation thread: its state, its id and where it is persisted
pub struct Agent {
    controller: Arc<TurnController>,
    thread_id: String,
    state: ConversationState,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Agent {
    /// Start a fresh thread
    pub fn new(controller: Arc<TurnController>, thread_id: impl Into<String>) -> Self {
        Self {
            controller,
            thread_id: thread_id.into(),
            state: ConversationState::new(),
            checkpointer: None,
        }
    }

    /// Open a thread from a checkpointer. An unknown thread id starts empty.
    pub async fn resume(
        controller: Arc<TurnController>,
        thread_id: impl Into<String>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<Self> {
        let thread_id = thread_id.into();
        let state = checkpointer.load(&thread_id).await?.unwrap_or_default();
        tracing::debug!(thread = %thread_id, messages = state.len(), "Resumed thread");
        Ok(Self {
            controller,
            thread_id,
            state,
            checkpointer: Some(checkpointer),
        })
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Run one turn and checkpoint the result.
    ///
    /// The state is saved whether or not the turn succeeded. A failed save
    /// after a successful turn is returned as an error; after a failed turn it
    /// is only logged, and the turn's error wins.
    pub async fn prompt(&mut self, input: impl AsRef<str>) -> Result<String> {
        let result = self.controller.run_turn(&mut self.state, input.as_ref()).await;

        let saved = self.checkpoint().await;
        match (result, saved) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(save_err)) => {
                tracing::warn!(thread = %self.thread_id, "Failed to checkpoint after error: {}", save_err);
                Err(e)
            }
        }
    }

    async fn checkpoint(&self) -> Result<()> {
        if let Some(checkpointer) = &self.checkpointer {
            checkpointer
                .save(&self.thread_id, &self.state)
                .await
                .map_err(Error::from)?;
        }
        Ok(())
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.state.history()
    }

    pub fn controller(&self) -> &Arc<TurnController> {
        &self.controller
    }

    /// Reset the conversation and persist the empty state
    pub async fn clear(&mut self) -> Result<()> {
        self.state.clear();
        self.checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointError, CheckpointInfo, MemoryCheckpointer};
    use crate::controller::AgentConfig;
    use crate::tool::ToolRegistry;
    use async_trait::async_trait;
    use cadence_ai::{Completion, CompletionRequest, Model, ModelClient, Provider};
    use std::num::NonZeroU32;

    /// Answers every request with an output echoing the last user message
    struct EchoClient;

    #[async_trait]
    impl ModelClient for EchoClient {
        async fn complete(&self, request: &CompletionRequest) -> cadence_ai::Result<Completion> {
            let last = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role() == cadence_ai::Role::User)
                .map(|m| m.content().to_string())
                .unwrap_or_default();
            if last == "break" {
                return Ok(Completion {
                    text: r#"{"step": "banana"}"#.into(),
                    ..Default::default()
                });
            }
            Ok(Completion {
                text: serde_json::json!({"step": "output", "content": format!("echo: {}", last)})
                    .to_string(),
                ..Default::default()
            })
        }
    }

    struct FailingCheckpointer;

    #[async_trait]
    impl Checkpointer for FailingCheckpointer {
        async fn save(&self, _: &str, _: &ConversationState) -> std::result::Result<(), CheckpointError> {
            Err(CheckpointError::Storage("read-only".into()))
        }
        async fn load(&self, _: &str) -> std::result::Result<Option<ConversationState>, CheckpointError> {
            Ok(None)
        }
        async fn list(&self) -> std::result::Result<Vec<CheckpointInfo>, CheckpointError> {
            Ok(vec![])
        }
        async fn delete(&self, id: &str) -> std::result::Result<(), CheckpointError> {
            Err(CheckpointError::NotFound(id.into()))
        }
    }

    fn controller() -> Arc<TurnController> {
        let config = AgentConfig::new(
            Model::new(Provider::Ollama, "gemma3:1b"),
            NonZeroU32::new(4).unwrap(),
        );
        Arc::new(TurnController::new(config, Arc::new(EchoClient), ToolRegistry::new()))
    }

    #[tokio::test]
    async fn test_prompt_checkpoints_and_resume_continues() {
        let saver: Arc<dyn Checkpointer> = Arc::new(MemoryCheckpointer::new());
        let controller = controller();

        let mut agent = Agent::new(controller.clone(), "thread-1").with_checkpointer(saver.clone());
        assert_eq!(agent.prompt("hello").await.unwrap(), "echo: hello");

        let mut resumed = Agent::resume(controller, "thread-1", saver.clone()).await.unwrap();
        assert_eq!(resumed.state(), agent.state());

        resumed.prompt("again").await.unwrap();
        assert_eq!(resumed.messages().len(), 4);
        assert_eq!(saver.list().await.unwrap()[0].message_count, 4);
    }

    #[tokio::test]
    async fn test_failed_turn_is_still_checkpointed() {
        let saver: Arc<dyn Checkpointer> = Arc::new(MemoryCheckpointer::new());
        let mut agent = Agent::new(controller(), "t").with_checkpointer(saver.clone());

        let err = agent.prompt("break").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));

        let stored = saver.load("t").await.unwrap().unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_after_success_is_reported() {
        let mut agent = Agent::new(controller(), "t").with_checkpointer(Arc::new(FailingCheckpointer));

        let err = agent.prompt("hi").await.unwrap_err();
        assert!(matches!(err, Error::Checkpoint(CheckpointError::Storage(_))));
        // The turn still happened
        assert_eq!(agent.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_turn_error_wins_over_checkpoint_error() {
        let mut agent = Agent::new(controller(), "t").with_checkpointer(Arc::new(FailingCheckpointer));

        let err = agent.prompt("break").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_resume_unknown_thread_starts_empty() {
        let saver: Arc<dyn Checkpointer> = Arc::new(MemoryCheckpointer::new());
        let agent = Agent::resume(controller(), "new", saver).await.unwrap();
        assert!(agent.messages().is_empty());
        assert_eq!(agent.thread_id(), "new");
    }

    #[tokio::test]
    async fn test_clear() {
        let saver: Arc<dyn Checkpointer> = Arc::new(MemoryCheckpointer::new());
        let mut agent = Agent::new(controller(), "t").with_checkpointer(saver.clone());
        agent.prompt("hello").await.unwrap();

        agent.clear().await.unwrap();
        assert!(agent.messages().is_empty());
        assert_eq!(saver.load("t").await.unwrap(), Some(ConversationState::new()));
    }
}
