//! Shell command tool, gated by an allow-list and confirmation

use async_trait::async_trait;
use cadence_agent::{Tool, ToolError};
use serde::{Deserialize, Serialize};
use std::io::{IsTerminal, Write};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::input::LineReader;

/// Maximum output size in bytes before truncation
const MAX_OUTPUT_SIZE: usize = 100_000; // 100KB
/// Maximum number of lines before truncation
const MAX_OUTPUT_LINES: usize = 1000;
/// Default execution timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Characters that chain or redirect commands in a shell
const SHELL_CONTROL: &[char] = &[';', '&', '|', '`', '$', '<', '>', '(', ')', '\n'];

/// When to ask the user before running a command
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    /// Ask for every command
    #[default]
    Always,
    /// Never ask: allow-listed commands run, everything else is denied
    Never,
    /// Ask only for commands not on the allow-list
    Unlisted,
}

/// What to do with one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run,
    Ask,
    Deny,
}

/// Allow-list of program names plus a confirmation mode
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    allow: Vec<String>,
    confirm: ConfirmMode,
}

impl CommandPolicy {
    pub fn new(allow: Vec<String>, confirm: ConfirmMode) -> Self {
        Self { allow, confirm }
    }

    /// Program a command starts with, without its directory
    pub fn program(command: &str) -> Option<&str> {
        let first = command.split_whitespace().next()?;
        first.rsplit('/').next()
    }

    /// A command is listed when it is a single program on the allow-list.
    /// Anything that chains or redirects is never listed.
    pub fn is_listed(&self, command: &str) -> bool {
        if command.contains(SHELL_CONTROL) {
            return false;
        }
        match Self::program(command) {
            Some(program) => self.allow.iter().any(|a| a == "*" || a == program),
            None => false,
        }
    }

    pub fn decide(&self, command: &str) -> Decision {
        let listed = self.is_listed(command);
        match (self.confirm, listed) {
            (ConfirmMode::Always, _) => Decision::Ask,
            (_, true) => Decision::Run,
            (ConfirmMode::Unlisted, false) => Decision::Ask,
            (ConfirmMode::Never, false) => Decision::Deny,
        }
    }
}

/// Asks a human whether a command may run
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, command: &str) -> bool;
}

/// Prompts on stderr and reads y/n from the shared stdin lines. Denies when
/// stdin is not a terminal.
pub struct StdinApprover {
    lines: LineReader,
    interactive: bool,
}

impl StdinApprover {
    pub fn new(lines: LineReader) -> Self {
        Self {
            lines,
            interactive: std::io::stdin().is_terminal(),
        }
    }
}

#[async_trait]
impl Approver for StdinApprover {
    async fn approve(&self, command: &str) -> bool {
        if !self.interactive {
            tracing::warn!("Cannot confirm '{}' without a terminal, denying", command);
            return false;
        }

        eprint!("\nRun `{}`? [y/N] ", command);
        std::io::stderr().flush().ok();

        match self.lines.next_line().await {
            Some(line) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}

/// Runs the input through `sh -c` (`cmd /C` on Windows)
pub struct CommandTool {
    policy: CommandPolicy,
    approver: Arc<dyn Approver>,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(policy: CommandPolicy, approver: Arc<dyn Approver>) -> Self {
        Self {
            policy,
            approver,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn check(&self, command: &str) -> Result<(), ToolError> {
        match self.policy.decide(command) {
            Decision::Run => Ok(()),
            Decision::Ask => {
                if self.approver.approve(command).await {
                    Ok(())
                } else {
                    Err(ToolError::Denied(format!("the user declined to run `{}`", command)))
                }
            }
            Decision::Deny => Err(ToolError::Denied(format!(
                "`{}` is not on the command allow-list",
                command
            ))),
        }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the current working directory and return its exit code and output"
    }

    fn input_hint(&self) -> &str {
        "command"
    }

    async fn invoke(&self, input: &str, _call_id: &str) -> Result<String, ToolError> {
        let command = input.trim();
        if command.is_empty() {
            return Err(ToolError::Failed("Empty command".into()));
        }
        self.check(command).await?;

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        tracing::debug!(command, "Running command");
        let child = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(ToolError::Failed(format!(
                    "Command timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let code = output.status.code().unwrap_or(-1);
        let mut result = format!("The command {} returned {}.", command, code);

        let stdout = truncate_output(&String::from_utf8_lossy(&output.stdout), "stdout");
        let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr), "stderr");
        for stream in [stdout, stderr] {
            if !stream.is_empty() {
                result.push('\n');
                result.push_str(&stream);
            }
        }

        if output.status.success() {
            Ok(result)
        } else {
            Err(ToolError::Failed(result))
        }
    }
}

/// Cut output to the line and size limits, noting where it was cut
fn truncate_output(text: &str, stream: &str) -> String {
    let text = text.trim_end();
    let mut out = String::new();
    let mut lines = 0usize;

    for line in text.lines() {
        if lines >= MAX_OUTPUT_LINES || out.len() + line.len() > MAX_OUTPUT_SIZE {
            out.push_str(&format!(
                "\n\n... ({} truncated at {} lines / {}KB)",
                stream,
                lines,
                MAX_OUTPUT_SIZE / 1024
            ));
            return out;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        lines += 1;
    }
    out
}
