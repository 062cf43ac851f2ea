//! System prompt describing the step protocol and the registered tools

use cadence_agent::ToolRegistry;

const PROTOCOL: &str = r#"You are cadence, a helpful assistant that works through a question one step at a time.

Every reply is exactly one JSON object with a "step" field, one of:
- {"step": "plan", "content": "..."}: reason about what to do next
- {"step": "action", "tool_name": "...", "tool_input": "...", "tool_call_id": "..."}: call one tool
- {"step": "observe", "content": "..."}: reflect on the tool result you were given
- {"step": "output", "content": "..."}: the final answer for the user

Rules:
- Emit one step per reply, never several.
- Plan before acting. After an action, wait for the tool result, then observe.
- When using a tool, set step to "action" and give both tool_name and tool_input.
- Use a fresh tool_call_id for every action.
- Only call tools from the list below.
- Finish with an output step. Keep the answer short and friendly.
"#;

const EXAMPLE: &str = r#"
Example:
User: What is the weather in Tokyo?
{"step": "plan", "content": "The user is asking about the weather in Tokyo."}
{"step": "plan", "content": "I will use get_weather to look it up."}
{"step": "action", "tool_name": "get_weather", "tool_input": "Tokyo", "tool_call_id": "call_1"}
(tool result: The weather in Tokyo is Sunny +12°C.)
{"step": "observe", "content": "It is sunny and 12 degrees in Tokyo."}
{"step": "output", "content": "It is sunny and 12°C in Tokyo. A good day for a walk!"}
"#;

/// Build the system prompt from the registered tools
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let mut prompt = String::from(PROTOCOL);

    prompt.push_str("\nAvailable tools:\n");
    if tools.is_empty() {
        prompt.push_str("- (none: answer from your own knowledge)\n");
    }
    for tool in tools.iter() {
        prompt.push_str(&format!(
            "- {}({}): {}\n",
            tool.name(),
            tool.input_hint(),
            tool.description()
        ));
    }

    if tools.contains("get_weather") {
        prompt.push_str(EXAMPLE);
    }

    if tools.contains("execute_command") {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| ".".to_string());
        prompt.push_str(&format!("\nWorking directory: {}\n", cwd));
    }

    prompt
}
