//! Conversation state: history, the last parsed step, and usage.

use std::collections::HashSet;

use cadence_ai::{Message, StructuredOutput, Usage};
use serde::{Deserialize, Serialize};

/// Everything one conversation carries between model calls.
///
/// History is append-only through this type. `last_output` is only ever set
/// together with the assistant entry it was parsed from, so when present it
/// always matches the most recent assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    history: Vec<Message>,
    #[serde(default)]
    last_output: Option<StructuredOutput>,
    #[serde(default)]
    usage: Usage,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation from previously persisted history
    pub fn from_history(history: Vec<Message>) -> Self {
        Self {
            history,
            last_output: None,
            usage: Usage::default(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn last_output(&self) -> Option<&StructuredOutput> {
        self.last_output.as_ref()
    }

    /// Token usage summed over every model call in this conversation
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all history and usage
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Append a non-assistant message (user, system or tool)
    pub(crate) fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Append a parsed model response and make it the current step
    pub(crate) fn record_output(&mut self, output: StructuredOutput) {
        self.history
            .push(Message::assistant(output.to_json(), Some(output.step())));
        self.last_output = Some(output);
    }

    /// Append a response that failed to parse; there is no current step after this
    pub(crate) fn record_malformed(&mut self, raw: impl Into<String>) {
        self.history.push(Message::assistant(raw, None));
        self.last_output = None;
    }

    pub(crate) fn add_usage(&mut self, usage: &Usage) {
        self.usage.accumulate(usage);
    }

    /// Whether a tool call id has already been used in this conversation
    pub fn has_tool_call_id(&self, id: &str) -> bool {
        self.history.iter().any(|m| m.tool_call_id() == Some(id))
    }

    /// All tool call ids used so far
    pub fn tool_call_ids(&self) -> HashSet<&str> {
        self.history.iter().filter_map(|m| m.tool_call_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_ai::{Role, Step};

    #[test]
    fn test_record_output_tracks_last_assistant() {
        let mut state = ConversationState::new();
        state.push(Message::user("hi"));
        state.record_output(StructuredOutput::Plan {
            content: "greet back".into(),
        });

        let last = state.history().last().unwrap();
        assert_eq!(last.role(), Role::Assistant);
        assert_eq!(last.step(), Some(Step::Plan));
        assert_eq!(
            StructuredOutput::parse(last.content()).unwrap(),
            *state.last_output().unwrap()
        );
    }

    #[test]
    fn test_record_malformed_clears_last_output() {
        let mut state = ConversationState::new();
        state.record_output(StructuredOutput::Plan { content: "x".into() });
        state.record_malformed(r#"{"step": "banana"}"#);

        assert!(state.last_output().is_none());
        assert_eq!(state.history().last().unwrap().step(), None);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_tool_call_ids() {
        let mut state = ConversationState::new();
        state.push(Message::tool_result("call_1", "get_weather", "sunny", false));
        state.push(Message::tool_result("call_2", "execute_command", "ok", false));

        assert!(state.has_tool_call_id("call_1"));
        assert!(!state.has_tool_call_id("call_3"));
        assert_eq!(state.tool_call_ids().len(), 2);
    }

    #[test]
    fn test_serde_roundtrip_preserves_everything() {
        let mut state = ConversationState::from_history(vec![Message::user("hello")]);
        state.record_output(StructuredOutput::Output {
            content: "hi there".into(),
        });
        state.add_usage(&Usage {
            prompt_tokens: 3,
            completion_tokens: 4,
            total_tokens: 7,
        });

        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_clear() {
        let mut state = ConversationState::from_history(vec![Message::user("hello")]);
        state.clear();
        assert!(state.is_empty());
        assert_eq!(state.usage().total_tokens, 0);
    }
}
