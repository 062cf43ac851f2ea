//! Core types for model interactions

use serde::{Deserialize, Serialize};

use crate::step::Step;

/// Known chat model providers. All of them speak the OpenAI Chat
/// Completions dialect; they differ in base URL, auth and schema support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Ollama,
    Groq,
    OpenRouter,
    Custom,
}

impl Provider {
    /// Parse a provider id as used in config files and CLI flags
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "ollama" => Some(Provider::Ollama),
            "groq" => Some(Provider::Groq),
            "openrouter" => Some(Provider::OpenRouter),
            "custom" => Some(Provider::Custom),
            _ => None,
        }
    }

    /// Identifier used in config files
    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
            Provider::Groq => "groq",
            Provider::OpenRouter => "openrouter",
            Provider::Custom => "custom",
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Ollama => "Ollama",
            Provider::Groq => "Groq",
            Provider::OpenRouter => "OpenRouter",
            Provider::Custom => "Custom",
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Ollama | Provider::Custom => None,
        }
    }

    /// Default Chat Completions base URL
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Custom => "",
        }
    }

    /// Structured output mode the provider handles reliably
    pub fn default_response_format(&self) -> ResponseFormat {
        match self {
            Provider::OpenAI | Provider::OpenRouter => ResponseFormat::JsonSchema,
            Provider::Ollama | Provider::Groq | Provider::Custom => ResponseFormat::JsonObject,
        }
    }
}

/// How the model is asked to produce structured output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// `response_format: {"type": "json_schema", ...}` with the step schema
    JsonSchema,
    /// `response_format: {"type": "json_object"}`; the schema lives in the prompt
    JsonObject,
}

/// Model definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier (e.g., "gpt-4.1")
    pub id: String,
    /// Provider
    pub provider: Provider,
    /// Base URL for API calls
    pub base_url: String,
    /// Structured output mode
    pub response_format: ResponseFormat,
    /// Sampling temperature, if the provider default is not wanted
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Model {
    /// Build a model definition with the provider's defaults
    pub fn new(provider: Provider, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider,
            base_url: provider.default_base_url().to_string(),
            response_format: provider.default_response_format(),
            temperature: None,
        }
    }

    /// Override the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Add another call's usage to this total
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System instruction
    System {
        content: String,
        #[serde(default)]
        timestamp: i64,
    },
    /// User message
    User {
        content: String,
        #[serde(default)]
        timestamp: i64,
    },
    /// Model response. `step` is absent when the response could not be parsed.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<Step>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Tool observation, linked to the action that produced it
    Tool {
        tool_call_id: String,
        tool_name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        timestamp: i64,
    },
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>, step: Option<Step>) -> Self {
        Self::Assistant {
            content: text.into(),
            step,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a tool observation message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Get the role
    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// Get the text content
    pub fn content(&self) -> &str {
        match self {
            Self::System { content, .. }
            | Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// The step this entry represents. Tool observations are always `observe`.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Assistant { step, .. } => *step,
            Self::Tool { .. } => Some(Step::Observe),
            _ => None,
        }
    }

    /// Correlation id for tool observations
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

/// Everything a model client needs for one completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to call
    pub model: Model,
    /// System prompt, sent ahead of the history
    pub system_prompt: Option<String>,
    /// Conversation history, oldest first
    pub messages: Vec<Message>,
}

/// Raw result of one completion
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Text the model produced; expected to be one step object in JSON
    pub text: String,
    /// Token usage for this call
    pub usage: Usage,
    /// Model that served the request, as reported by the provider
    pub model: Option<String>,
}
