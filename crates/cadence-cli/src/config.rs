//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::tools::ConfirmMode;

/// Model calls per turn when neither the config nor `--max-steps` set one
pub const DEFAULT_MAX_STEPS: u32 = 16;

/// Configuration for cadence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model to use
    pub model: Option<String>,
    /// Default provider (openai, ollama, groq, openrouter, custom)
    pub provider: Option<String>,
    /// Override the provider's Chat Completions base URL
    pub base_url: Option<String>,
    /// Most model calls one turn may make
    pub max_steps: Option<u32>,
    /// Retries for transient model errors (rate limits, 5xx)
    pub retries: Option<u32>,
    /// Custom system prompt file path
    pub system_prompt_file: Option<String>,
    /// Command tool settings
    #[serde(default)]
    pub commands: CommandSettings,
    /// API keys (alternative to environment variables)
    #[serde(default)]
    pub api_keys: ApiKeys,
}

/// Gate for the execute_command tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Programs that may run without asking (depending on `confirm`)
    pub allow: Vec<String>,
    /// When to ask before running a command
    pub confirm: Option<ConfirmMode>,
}

/// API key configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub groq: Option<String>,
    pub openrouter: Option<String>,
    pub custom: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CADENCE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`; a missing or broken file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Write the example config file if none exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Get API key for a provider, checking config then env
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        let from_config = match provider {
            "openai" => self.api_keys.openai.clone(),
            "groq" => self.api_keys.groq.clone(),
            "openrouter" => self.api_keys.openrouter.clone(),
            "custom" => self.api_keys.custom.clone(),
            _ => None,
        };

        if from_config.is_some() {
            return from_config;
        }

        let env_var = match provider {
            "openai" => "OPENAI_API_KEY",
            "groq" => "GROQ_API_KEY",
            "openrouter" => "OPENROUTER_API_KEY",
            "custom" => "CADENCE_API_KEY",
            _ => return None,
        };

        std::env::var(env_var).ok()
    }

    /// Read the custom system prompt file, if one is configured
    pub fn system_prompt(&self) -> Option<String> {
        let raw = self.system_prompt_file.as_ref()?;
        let path = match raw.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()?.join(rest),
            None => PathBuf::from(raw),
        };
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to read system prompt file {}: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# cadence configuration file
# Place at ~/.config/cadence/config.toml (Linux), ~/Library/Application Support/cadence/config.toml (Mac)
# or %APPDATA%\cadence\config.toml (Windows). CADENCE_CONFIG_PATH overrides the location.

# Default model to use
model = "gpt-4.1"

# Default provider (openai, ollama, groq, openrouter, custom)
provider = "openai"

# Chat Completions base URL (optional, defaults per provider)
# base_url = "http://localhost:11434/v1"

# Most model calls one turn may make before giving up
max_steps = 16

# Retries for rate limits and server errors (0 = fail immediately)
retries = 0

# Custom system prompt file (optional)
# system_prompt_file = "~/.config/cadence/system_prompt.txt"

[commands]
# Programs execute_command may run
allow = ["ls", "pwd", "cat", "echo"]
# When to ask before running a command: always, never, unlisted
confirm = "unlisted"

# API keys (optional - can also use environment variables)
# It's recommended to use environment variables instead for security
[api_keys]
# openai = "sk-..."
# groq = "gsk_..."
# openrouter = "sk-or-..."
"#
}
