//! Decide what happens after a model response.

use cadence_ai::StructuredOutput;

/// Next move of the turn loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Go back to the model (after `plan` or `observe`)
    CallModel,
    /// Run a tool, append its observation, then go back to the model
    RunTool {
        tool_name: &'a str,
        tool_input: &'a str,
        tool_call_id: Option<&'a str>,
    },
    /// Terminal: hand this text to the caller
    Finish(&'a str),
}

/// Route on the step of a parsed response.
pub fn route(output: &StructuredOutput) -> Route<'_> {
    match output {
        StructuredOutput::Plan { .. } | StructuredOutput::Observe { .. } => Route::CallModel,
        StructuredOutput::Action {
            tool_name,
            tool_input,
            tool_call_id,
            ..
        } => Route::RunTool {
            tool_name,
            tool_input,
            tool_call_id: tool_call_id.as_deref(),
        },
        StructuredOutput::Output { content } => Route::Finish(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_and_observe_call_model() {
        assert_eq!(
            route(&StructuredOutput::Plan { content: "a".into() }),
            Route::CallModel
        );
        assert_eq!(
            route(&StructuredOutput::Observe { content: "b".into() }),
            Route::CallModel
        );
    }

    #[test]
    fn test_action_runs_tool() {
        let out = StructuredOutput::Action {
            tool_name: "get_weather".into(),
            tool_input: "Paris".into(),
            tool_call_id: Some("call_9".into()),
            content: None,
        };
        assert_eq!(
            route(&out),
            Route::RunTool {
                tool_name: "get_weather",
                tool_input: "Paris",
                tool_call_id: Some("call_9"),
            }
        );
    }

    #[test]
    fn test_output_finishes_with_content_unchanged() {
        let out = StructuredOutput::Output {
            content: "  It is 18°C and clear in Paris.\n".into(),
        };
        assert_eq!(route(&out), Route::Finish("  It is 18°C and clear in Paris.\n"));
    }
}
