//! The turn controller: plan, action, observe, output.

use std::num::NonZeroU32;
use std::sync::Arc;

use cadence_ai::{CompletionRequest, Message, Model, ModelClient, StructuredOutput, Usage};
use tokio::sync::broadcast;

use crate::{
    conversation::ConversationState,
    error::{Error, Result},
    events::AgentEvent,
    router::{Route, route},
    tool::{Observation, ToolInvocation, ToolRegistry},
};

/// Controller configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System prompt, sent ahead of the history on every model call
    pub system_prompt: Option<String>,
    /// Model to use
    pub model: Model,
    /// Most model calls one turn may make before giving up
    pub max_model_calls: NonZeroU32,
}

impl AgentConfig {
    pub fn new(model: Model, max_model_calls: NonZeroU32) -> Self {
        Self {
            system_prompt: None,
            model,
            max_model_calls,
        }
    }

    /// Like [`AgentConfig::new`], for a bound read from user input
    pub fn try_new(model: Model, max_model_calls: u32) -> Result<Self> {
        let max_model_calls = NonZeroU32::new(max_model_calls).ok_or_else(|| {
            Error::InvalidConfig("max model calls per turn must be at least 1".into())
        })?;
        Ok(Self::new(model, max_model_calls))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Per-turn counters
#[derive(Debug, Default)]
struct TurnStats {
    model_calls: u32,
    usage: Usage,
}

/// Drives one user turn at a time against a model client and tool registry.
///
/// Holds no conversation state of its own: every turn works on the
/// [`ConversationState`] passed in, so one controller can serve many
/// conversations concurrently.
pub struct TurnController {
    config: AgentConfig,
    client: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    event_tx: broadcast::Sender<AgentEvent>,
}

impl TurnController {
    pub fn new(config: AgentConfig, client: Arc<dyn ModelClient>, tools: ToolRegistry) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            client,
            tools,
            event_tx,
        }
    }

    /// Subscribe to turn events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn: append `user_message`, then call the model until it
    /// reports an `output` step, and return that step's content unchanged.
    ///
    /// `state` is updated in place. On error it keeps everything appended
    /// up to the failure, including a malformed response's raw text.
    pub async fn run_turn(&self, state: &mut ConversationState, user_message: &str) -> Result<String> {
        let _ = self.event_tx.send(AgentEvent::TurnStart {
            user_message: user_message.to_string(),
        });
        state.push(Message::user(user_message));

        let mut stats = TurnStats::default();
        let result = self.drive(state, &mut stats).await;

        match &result {
            Ok(_) => {
                tracing::debug!(
                    model_calls = stats.model_calls,
                    total_tokens = stats.usage.total_tokens,
                    "Turn finished"
                );
                let _ = self.event_tx.send(AgentEvent::TurnEnd {
                    model_calls: stats.model_calls,
                    usage: stats.usage,
                });
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "Turn failed: {}", e);
                let _ = self.event_tx.send(AgentEvent::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }

        result
    }

    async fn drive(&self, state: &mut ConversationState, stats: &mut TurnStats) -> Result<String> {
        let limit = self.config.max_model_calls.get();

        loop {
            if stats.model_calls >= limit {
                return Err(Error::NonTerminating { limit });
            }
            stats.model_calls += 1;

            let output = self.call_model(state, stats).await?;
            let output = assign_call_id(state, output);
            state.record_output(output.clone());

            match route(&output) {
                Route::CallModel => {
                    let event = match &output {
                        StructuredOutput::Observe { content } => AgentEvent::Observe {
                            content: content.clone(),
                        },
                        _ => AgentEvent::Plan {
                            content: output.content().unwrap_or_default().to_string(),
                        },
                    };
                    let _ = self.event_tx.send(event);
                }
                Route::RunTool {
                    tool_name,
                    tool_input,
                    tool_call_id,
                } => {
                    let invocation = ToolInvocation {
                        tool_name: tool_name.to_string(),
                        tool_input: tool_input.to_string(),
                        // Always set by assign_call_id
                        tool_call_id: tool_call_id.unwrap_or_default().to_string(),
                    };
                    let observation = self.run_tool(&invocation).await?;
                    state.push(Message::tool_result(
                        invocation.tool_call_id,
                        invocation.tool_name,
                        observation.content,
                        observation.is_error,
                    ));
                }
                Route::Finish(content) => {
                    let _ = self.event_tx.send(AgentEvent::Output {
                        content: content.to_string(),
                    });
                    return Ok(content.to_string());
                }
            }
        }
    }

    /// Call the model with the full history and parse its reply
    async fn call_model(
        &self,
        state: &mut ConversationState,
        stats: &mut TurnStats,
    ) -> Result<StructuredOutput> {
        let _ = self.event_tx.send(AgentEvent::ModelCall {
            call_number: stats.model_calls,
        });

        let request = CompletionRequest {
            model: self.config.model.clone(),
            system_prompt: self.config.system_prompt.clone(),
            messages: state.history().to_vec(),
        };

        tracing::debug!(
            model = %request.model.id,
            call_number = stats.model_calls,
            messages = request.messages.len(),
            "Calling model"
        );

        let completion = self.client.complete(&request).await?;
        stats.usage.accumulate(&completion.usage);
        state.add_usage(&completion.usage);

        match StructuredOutput::parse(&completion.text) {
            Ok(output) => Ok(output),
            Err(e) => {
                state.record_malformed(completion.text);
                Err(Error::MalformedResponse {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn run_tool(&self, invocation: &ToolInvocation) -> Result<Observation> {
        let tool = self
            .tools
            .get(&invocation.tool_name)
            .ok_or_else(|| Error::UnknownTool {
                name: invocation.tool_name.clone(),
            })?;

        tracing::debug!(
            tool = %invocation.tool_name,
            call_id = %invocation.tool_call_id,
            "Invoking tool"
        );
        let _ = self.event_tx.send(AgentEvent::ToolExecutionStart {
            tool_call_id: invocation.tool_call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            input: invocation.tool_input.clone(),
        });

        let observation = Observation::from(
            tool.invoke(&invocation.tool_input, &invocation.tool_call_id)
                .await,
        );
        if observation.is_error {
            tracing::warn!(tool = %invocation.tool_name, "{}", observation.content);
        }

        let _ = self.event_tx.send(AgentEvent::ToolExecutionEnd {
            tool_call_id: invocation.tool_call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            observation: observation.content.clone(),
            is_error: observation.is_error,
        });

        Ok(observation)
    }
}

/// Give an action a call id that is unique within the conversation.
///
/// The model's own id is kept unless it is already taken.
fn assign_call_id(state: &ConversationState, output: StructuredOutput) -> StructuredOutput {
    match output {
        StructuredOutput::Action {
            tool_name,
            tool_input,
            tool_call_id,
            content,
        } => {
            let tool_call_id = match tool_call_id {
                Some(id) if !state.has_tool_call_id(&id) => id,
                proposed => {
                    if let Some(id) = proposed {
                        tracing::warn!("Model reused tool call id '{}', assigning a new one", id);
                    }
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                }
            };
            StructuredOutput::Action {
                tool_name,
                tool_input,
                tool_call_id: Some(tool_call_id),
                content,
            }
        }
        other => other,
    }
}
