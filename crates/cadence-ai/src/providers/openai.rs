//! OpenAI Chat Completions client
//!
//! Works against any server speaking the same dialect (Ollama, Groq,
//! OpenRouter, local proxies). Responses are requested in JSON mode so the
//! model answers with exactly one step object.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ModelClient;
use crate::{
    error::{Error, Result},
    step::{StructuredOutput, step_schema},
    types::{Completion, CompletionRequest, Message, Model, ResponseFormat, Usage},
};

/// Retry configuration for transient provider failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    /// No retries: failures surface to the caller immediately.
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// OpenAI-compatible API client
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: Option<String>,
    retry_config: RetryConfig,
}

impl OpenAIClient {
    /// Create a client with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: Some(api_key.into()),
            retry_config: RetryConfig::default(),
        }
    }

    /// Create a client that sends no Authorization header (e.g. local Ollama)
    pub fn without_auth() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<Completion> {
        if request.model.base_url.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "no base URL configured for model {}",
                request.model.id
            )));
        }

        let body = build_request(request);
        let url = format!("{}/chat/completions", request.model.base_url);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), &text, retry_after));
        }

        let text = response.text().await?;
        parse_response(&text)
    }
}

#[async_trait]
impl ModelClient for OpenAIClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut attempt = 0u32;
        loop {
            match self.complete_once(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < self.retry_config.max_retries && e.is_retryable() => {
                    let delay = self.retry_config.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.retry_config.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn build_request(request: &CompletionRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(ref system_prompt) = request.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system_prompt.clone(),
        });
    }

    messages.extend(request.messages.iter().map(convert_message));

    ChatRequest {
        model: request.model.id.clone(),
        messages,
        response_format: response_format(&request.model),
        temperature: request.model.temperature,
    }
}

fn response_format(model: &Model) -> serde_json::Value {
    match model.response_format {
        ResponseFormat::JsonSchema => serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "step",
                "strict": false,
                "schema": step_schema(),
            }
        }),
        ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
    }
}

/// Render a history entry for the wire.
///
/// Tool observations become assistant messages holding an `observe` step
/// object: JSON mode has no native tool calls to attach a `tool` role to.
fn convert_message(msg: &Message) -> ChatMessage {
    match msg {
        Message::System { content, .. } => ChatMessage {
            role: "system".to_string(),
            content: content.clone(),
        },
        Message::User { content, .. } => ChatMessage {
            role: "user".to_string(),
            content: content.clone(),
        },
        Message::Assistant { content, .. } => ChatMessage {
            role: "assistant".to_string(),
            content: content.clone(),
        },
        Message::Tool {
            tool_call_id,
            tool_name,
            content,
            ..
        } => {
            let observe = serde_json::json!({
                "step": "observe",
                "content": content,
                "tool_name": tool_name,
                "tool_call_id": tool_call_id,
            });
            ChatMessage {
                role: "assistant".to_string(),
                content: observe.to_string(),
            }
        }
    }
}

fn parse_response(text: &str) -> Result<Completion> {
    let response: ChatResponse = serde_json::from_str(text)?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response has no choices".to_string()))?;

    if let Some(refusal) = choice.message.refusal {
        // Refusals still have to flow through the step protocol.
        let output = StructuredOutput::Output { content: refusal };
        return Ok(Completion {
            text: output.to_json(),
            usage: response.usage.unwrap_or_default(),
            model: response.model,
        });
    }

    let content = choice
        .message
        .content
        .ok_or_else(|| Error::UnexpectedResponse("message has no content".to_string()))?;

    tracing::debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        "completion received"
    );

    Ok(Completion {
        text: content,
        usage: response.usage.unwrap_or_default(),
        model: response.model,
    })
}

// Chat Completions API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Provider, Step};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(messages: Vec<Message>, model: Model) -> CompletionRequest {
        CompletionRequest {
            model,
            system_prompt: Some("You work in plan, action, observe & output mode.".into()),
            messages,
        }
    }

    #[test]
    fn test_build_request_prepends_system_prompt() {
        let req = request(
            vec![Message::user("What is the weather in Tokyo?")],
            Model::new(Provider::OpenAI, "gpt-4.1"),
        );
        let body = serde_json::to_value(build_request(&req)).unwrap();

        assert_eq!(body["model"], "gpt-4.1");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is the weather in Tokyo?");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"][0],
            "step"
        );
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_build_request_json_object_mode() {
        let req = request(vec![], Model::new(Provider::Ollama, "gemma3:1b"));
        let body = serde_json::to_value(build_request(&req)).unwrap();
        assert_eq!(body["response_format"], serde_json::json!({"type": "json_object"}));
    }

    #[test]
    fn test_tool_message_rendered_as_observe_step() {
        let msg = Message::tool_result("call_7", "get_weather", "The weather in Paris is Clear +18°C.", false);
        let wire = convert_message(&msg);
        assert_eq!(wire.role, "assistant");

        let observe = StructuredOutput::parse(&wire.content).unwrap();
        assert_eq!(observe.step(), Step::Observe);
        assert_eq!(observe.content(), Some("The weather in Paris is Clear +18°C."));

        let raw: serde_json::Value = serde_json::from_str(&wire.content).unwrap();
        assert_eq!(raw["tool_call_id"], "call_7");
    }

    #[test]
    fn test_parse_response_extracts_content_and_usage() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4.1-2025-04-14",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"step\":\"plan\",\"content\":\"thinking\"}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 9, "total_tokens": 129}
        }"#;
        let completion = parse_response(body).unwrap();
        assert_eq!(completion.text, r#"{"step":"plan","content":"thinking"}"#);
        assert_eq!(completion.usage.total_tokens, 129);
        assert_eq!(completion.model.as_deref(), Some("gpt-4.1-2025-04-14"));
    }

    #[test]
    fn test_parse_response_refusal_becomes_output() {
        let body = r#"{"choices": [{"message": {"content": null, "refusal": "I can't help with that."}}]}"#;
        let completion = parse_response(body).unwrap();
        let out = StructuredOutput::parse(&completion.text).unwrap();
        assert_eq!(
            out,
            StructuredOutput::Output {
                content: "I can't help with that.".into()
            }
        );
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_base_url_is_config_error() {
        let client = OpenAIClient::without_auth();
        let req = request(vec![Message::user("hi")], Model::new(Provider::Custom, "local"));
        let err = client.complete(&req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    const OK_BODY: &str = r#"{"choices": [{"message": {"content": "{\"step\":\"output\",\"content\":\"hi\"}"}}]}"#;

    /// Read one HTTP request (headers plus Content-Length body) off the socket
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Serve the given responses in order, one per connection, counting requests
    async fn serve(responses: Vec<(&'static str, &'static str, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for (status, headers, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    headers,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn local_request(base_url: String) -> CompletionRequest {
        request(
            vec![Message::user("hi")],
            Model::new(Provider::Custom, "local").with_base_url(base_url),
        )
    }

    #[tokio::test]
    async fn test_complete_success() {
        let (base, hits) = serve(vec![("200 OK", "", OK_BODY)]).await;
        let client = OpenAIClient::without_auth();

        let completion = client.complete(&local_request(base)).await.unwrap();

        assert_eq!(completion.text, r#"{"step":"output","content":"hi"}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_after_one_request() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let (base, hits) = serve(vec![("401 Unauthorized", "", body), ("200 OK", "", OK_BODY)]).await;
        let client = OpenAIClient::new("sk-wrong");

        let err = client.complete(&local_request(base)).await.unwrap_err();

        assert!(matches!(err, Error::Auth(ref m) if m == "Incorrect API key provided"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let (base, hits) = serve(vec![(
            "429 Too Many Requests",
            "Retry-After: 7\r\n",
            r#"{"error": {"message": "Rate limit reached", "type": "rate_limit_error"}}"#,
        )])
        .await;
        let client = OpenAIClient::without_auth();

        let err = client.complete(&local_request(base)).await.unwrap_err();

        assert!(matches!(err, Error::RateLimited { retry_after: Some(7) }));
        // No retries by default
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried_when_configured() {
        let (base, hits) = serve(vec![
            ("503 Service Unavailable", "", "upstream unavailable"),
            ("200 OK", "", OK_BODY),
        ])
        .await;
        let client = OpenAIClient::without_auth().with_retry_config(RetryConfig {
            max_retries: 1,
            initial_delay: Duration::ZERO,
            ..Default::default()
        });

        let completion = client.complete(&local_request(base)).await.unwrap();

        assert_eq!(completion.text, r#"{"step":"output","content":"hi"}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let (base, hits) = serve(vec![
            ("502 Bad Gateway", "", "<html>\n<body>nginx</body>\n</html>\n"),
            ("502 Bad Gateway", "", "<html>\n<body>nginx</body>\n</html>\n"),
        ])
        .await;
        let client = OpenAIClient::without_auth().with_retry_config(RetryConfig {
            max_retries: 1,
            initial_delay: Duration::ZERO,
            ..Default::default()
        });

        let err = client.complete(&local_request(base)).await.unwrap_err();

        assert!(matches!(err, Error::Api { ref error_type, .. } if error_type == "server_error"));
        assert!(!err.to_string().contains('\n'));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
