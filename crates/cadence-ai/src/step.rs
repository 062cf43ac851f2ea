//! The step protocol: what the model must answer with on every call.
//!
//! The model reports where it is in the plan → action → observe → output
//! cycle as one JSON object. On the wire that object is loose (every field
//! optional, `step` a free string); [`StructuredOutput::parse`] validates it
//! against [`step_schema`] and turns it into a tagged enum so nothing past
//! this module ever branches on a string.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stage of the turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Plan,
    Action,
    Observe,
    Output,
}

impl Step {
    /// All steps, in cycle order
    pub const ALL: [Step; 4] = [Step::Plan, Step::Action, Step::Observe, Step::Output];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::Action => "action",
            Step::Observe => "observe",
            Step::Output => "output",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a model response could not be turned into a [`StructuredOutput`]
#[derive(Error, Debug)]
pub enum StepError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response does not match the step schema: {0}")]
    Schema(String),

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("action step is missing '{0}'")]
    MissingField(&'static str),

    #[error("{0} step is missing 'content'")]
    MissingContent(Step),
}

/// The step object as it appears on the wire.
///
/// Accepts the older key spellings (`function`, `input`, `output`) used by
/// prompts that predate the `tool_*` names. Unknown keys such as `role` are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireOutput {
    pub step: String,
    #[serde(default, alias = "output", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, alias = "function", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, alias = "input", skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A validated model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireOutput", into = "WireOutput")]
pub enum StructuredOutput {
    Plan {
        content: String,
    },
    Action {
        tool_name: String,
        tool_input: String,
        /// Correlation id proposed by the model, if any
        tool_call_id: Option<String>,
        /// Optional commentary accompanying the action
        content: Option<String>,
    },
    Observe {
        content: String,
    },
    Output {
        content: String,
    },
}

impl StructuredOutput {
    /// Parse raw model text into a validated step.
    ///
    /// Code fences around the object are tolerated; everything else must be
    /// a single JSON object matching [`step_schema`].
    pub fn parse(text: &str) -> Result<Self, StepError> {
        let value: serde_json::Value = serde_json::from_str(strip_code_fence(text))?;

        if let Some(validator) = STEP_VALIDATOR.as_ref() {
            let errors: Vec<String> = validator
                .iter_errors(&value)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            if !errors.is_empty() {
                return Err(StepError::Schema(errors.join("; ")));
            }
        }

        let wire: WireOutput = serde_json::from_value(value)?;
        Self::try_from(wire)
    }

    /// The step tag
    pub fn step(&self) -> Step {
        match self {
            Self::Plan { .. } => Step::Plan,
            Self::Action { .. } => Step::Action,
            Self::Observe { .. } => Step::Observe,
            Self::Output { .. } => Step::Output,
        }
    }

    /// Human-readable text, if the step carries any
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Plan { content } | Self::Observe { content } | Self::Output { content } => {
                Some(content)
            }
            Self::Action { content, .. } => content.as_deref(),
        }
    }

    /// Canonical JSON text, as stored in history and replayed to the model
    pub fn to_json(&self) -> String {
        serde_json::to_string(&WireOutput::from(self.clone())).unwrap_or_default()
    }
}

impl TryFrom<WireOutput> for StructuredOutput {
    type Error = StepError;

    fn try_from(wire: WireOutput) -> Result<Self, Self::Error> {
        let step = Step::from_name(wire.step.trim())
            .ok_or_else(|| StepError::UnknownStep(wire.step.clone()))?;

        let require_content = |content: Option<String>| content.ok_or(StepError::MissingContent(step));

        match step {
            Step::Plan => Ok(Self::Plan {
                content: require_content(wire.content)?,
            }),
            Step::Observe => Ok(Self::Observe {
                content: require_content(wire.content)?,
            }),
            Step::Output => Ok(Self::Output {
                content: require_content(wire.content)?,
            }),
            Step::Action => {
                let tool_name = wire
                    .tool_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or(StepError::MissingField("tool_name"))?;
                let tool_input = wire.tool_input.ok_or(StepError::MissingField("tool_input"))?;
                Ok(Self::Action {
                    tool_name,
                    tool_input,
                    tool_call_id: wire.tool_call_id.filter(|id| !id.trim().is_empty()),
                    content: wire.content.filter(|c| !c.is_empty()),
                })
            }
        }
    }
}

impl From<StructuredOutput> for WireOutput {
    fn from(output: StructuredOutput) -> Self {
        let step = output.step().as_str().to_string();
        match output {
            StructuredOutput::Plan { content }
            | StructuredOutput::Observe { content }
            | StructuredOutput::Output { content } => WireOutput {
                step,
                content: Some(content),
                ..Default::default()
            },
            StructuredOutput::Action {
                tool_name,
                tool_input,
                tool_call_id,
                content,
            } => WireOutput {
                step,
                content,
                tool_name: Some(tool_name),
                tool_input: Some(tool_input),
                tool_call_id,
            },
        }
    }
}

/// JSON Schema describing one step object
pub fn step_schema() -> serde_json::Value {
    let nullable_string = serde_json::json!({ "type": ["string", "null"] });
    serde_json::json!({
        "type": "object",
        "properties": {
            "step": {
                "type": "string",
                "enum": Step::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                "description": "The current step in the process (plan, action, observe, output)"
            },
            "content": {
                "type": ["string", "null"],
                "description": "Text for plan, observe and output steps"
            },
            "tool_name": {
                "type": ["string", "null"],
                "description": "The name of the tool if the step is action"
            },
            "tool_input": {
                "type": ["string", "null"],
                "description": "The input of the tool if the step is action"
            },
            "tool_call_id": {
                "type": ["string", "null"],
                "description": "A unique id for the tool call if the step is action"
            },
            "role": nullable_string
        },
        "required": ["step"]
    })
}

static STEP_VALIDATOR: LazyLock<Option<jsonschema::Validator>> = LazyLock::new(|| {
    match jsonschema::validator_for(&step_schema()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Step schema failed to compile, skipping validation: {}", e);
            None
        }
    }
});

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Info string (`json`, `JSON`, ...)
    let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let out = StructuredOutput::parse(
            r#"{"step": "plan", "content": "The user is asking about the weather in Tokyo."}"#,
        )
        .unwrap();
        assert_eq!(out.step(), Step::Plan);
        assert_eq!(
            out.content(),
            Some("The user is asking about the weather in Tokyo.")
        );
    }

    #[test]
    fn test_parse_action_with_id() {
        let out = StructuredOutput::parse(
            r#"{"step": "action", "tool_name": "get_weather", "tool_input": "Tokyo", "tool_call_id": "1234567890"}"#,
        )
        .unwrap();
        assert_eq!(
            out,
            StructuredOutput::Action {
                tool_name: "get_weather".into(),
                tool_input: "Tokyo".into(),
                tool_call_id: Some("1234567890".into()),
                content: None,
            }
        );
    }

    #[test]
    fn test_parse_legacy_keys() {
        let out = StructuredOutput::parse(
            r#"{"step": "action", "function": "execute_command", "input": "pwd"}"#,
        )
        .unwrap();
        match out {
            StructuredOutput::Action {
                tool_name,
                tool_input,
                tool_call_id,
                ..
            } => {
                assert_eq!(tool_name, "execute_command");
                assert_eq!(tool_input, "pwd");
                assert!(tool_call_id.is_none());
            }
            other => panic!("expected action, got {:?}", other),
        }

        let out = StructuredOutput::parse(r#"{"step": "observe", "output": "12 degrees Celsius"}"#)
            .unwrap();
        assert_eq!(out.content(), Some("12 degrees Celsius"));
    }

    #[test]
    fn test_parse_ignores_role_key() {
        let out = StructuredOutput::parse(
            r#"{"step": "output", "role": "assistant", "content": "done"}"#,
        )
        .unwrap();
        assert_eq!(out, StructuredOutput::Output { content: "done".into() });
    }

    #[test]
    fn test_parse_unknown_step_is_schema_error() {
        let err = StructuredOutput::parse(r#"{"step": "banana", "content": "?"}"#).unwrap_err();
        match err {
            StepError::Schema(msg) => assert!(msg.contains("banana"), "message: {}", msg),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_step() {
        let err = StructuredOutput::parse(r#"{"content": "hi"}"#).unwrap_err();
        assert!(matches!(err, StepError::Schema(_)));
    }

    #[test]
    fn test_parse_not_json() {
        let err = StructuredOutput::parse("The weather is nice").unwrap_err();
        assert!(matches!(err, StepError::InvalidJson(_)));
    }

    #[test]
    fn test_parse_action_missing_tool_name() {
        let err = StructuredOutput::parse(r#"{"step": "action", "tool_input": "Paris"}"#)
            .unwrap_err();
        assert!(matches!(err, StepError::MissingField("tool_name")));

        let err = StructuredOutput::parse(
            r#"{"step": "action", "tool_name": "  ", "tool_input": "Paris"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StepError::MissingField("tool_name")));
    }

    #[test]
    fn test_parse_action_missing_tool_input() {
        let err = StructuredOutput::parse(r#"{"step": "action", "tool_name": "get_weather"}"#)
            .unwrap_err();
        assert!(matches!(err, StepError::MissingField("tool_input")));
    }

    #[test]
    fn test_parse_output_missing_content() {
        let err = StructuredOutput::parse(r#"{"step": "output"}"#).unwrap_err();
        assert!(matches!(err, StepError::MissingContent(Step::Output)));
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let text = "```json\n{\"step\": \"plan\", \"content\": \"x\"}\n```";
        let out = StructuredOutput::parse(text).unwrap();
        assert_eq!(out.step(), Step::Plan);
    }

    #[test]
    fn test_parse_strips_fence_with_any_info_string() {
        for text in [
            "```JSON\n{\"step\": \"output\", \"content\": \"hi\"}\n```",
            "```Json {\"step\": \"output\", \"content\": \"hi\"}```",
            "```\n{\"step\": \"output\", \"content\": \"hi\"}\n```",
        ] {
            let out = StructuredOutput::parse(text).unwrap();
            assert_eq!(out.content(), Some("hi"), "{}", text);
        }
    }

    #[test]
    fn test_to_json_is_parseable() {
        let action = StructuredOutput::Action {
            tool_name: "get_weather".into(),
            tool_input: "Paris".into(),
            tool_call_id: Some("call_1".into()),
            content: None,
        };
        let json = action.to_json();
        assert!(!json.contains("content"));
        assert_eq!(StructuredOutput::parse(&json).unwrap(), action);
    }

    #[test]
    fn test_schema_lists_all_steps() {
        let schema = step_schema();
        let steps = schema["properties"]["step"]["enum"].as_array().unwrap();
        assert_eq!(steps.len(), 4);
        assert!(steps.contains(&serde_json::json!("observe")));
    }
}
