//! Agent invocation.
//!
//! The loop delegates actual task work to the Claude Code CLI: one `claude -p`
//! process per iteration, prompt on stdin, bounded by the configured timeout.
//! The process's exit status is only a fallback signal - the queue document the
//! agent rewrites is the source of truth for what happened (see
//! [`crate::runloop`]).
//!
//! [`AgentInvoker`] is the capability seam; tests drive the loop with scripted
//! implementations instead of a live CLI.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

// ============================================================================
// Errors and Outcomes
// ============================================================================

/// Failure to launch or talk to the agent process.
///
/// These are recoverable at the loop level: the iteration records a failed
/// attempt and moves on, it never aborts the loop.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The agent CLI binary is not installed or not on PATH.
    #[error("Agent CLI not found: {cli} is not installed or not in PATH")]
    CliNotFound { cli: String },

    /// Spawning the process failed.
    #[error("Failed to spawn agent process: {message}")]
    Spawn { message: String },

    /// Writing the prompt or collecting output failed.
    #[error("Agent process I/O failed: {message}")]
    Io { message: String },
}

/// What happened to one delegated execution.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// The process ran to completion within the timeout.
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The process exceeded the timeout and was abandoned.
    TimedOut { timeout: Duration },
}

impl AgentOutcome {
    /// Did the process exit zero?
    #[must_use]
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, Self::Completed { exit_code: 0, .. })
    }
}

// ============================================================================
// Stderr Classification
// ============================================================================

/// Coarse classification of agent stderr, for log lines and notifications.
///
/// The loop never branches on this - retry accounting is driven purely by the
/// outcome - but a recognizable label beats a raw stderr dump in the progress
/// log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureHint {
    /// Rate limit / too-many-requests style failure.
    RateLimited,
    /// Authentication or API-key problem.
    AuthFailed,
    /// Prompt exceeded the model's context window.
    ContextLength,
    /// Network or connection trouble.
    Connection,
    /// Nothing recognizable.
    Unknown,
}

impl FailureHint {
    /// Classify stderr output from a failed agent run.
    #[must_use]
    pub fn from_stderr(stderr: &str) -> Self {
        let patterns: [(&str, Self); 4] = [
            (r"(?i)rate limit|too many requests|429", Self::RateLimited),
            (r"(?i)authentication|unauthorized|api key|401", Self::AuthFailed),
            (r"(?i)context length|too long|max tokens", Self::ContextLength),
            (r"(?i)connection|network|ECONNRE", Self::Connection),
        ];

        for (pattern, hint) in patterns {
            if Regex::new(pattern).is_ok_and(|re| re.is_match(stderr)) {
                return hint;
            }
        }
        Self::Unknown
    }
}

impl std::fmt::Display for FailureHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::AuthFailed => "authentication failed",
            Self::ContextLength => "context length exceeded",
            Self::Connection => "connection error",
            Self::Unknown => "unclassified error",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Invoker Trait
// ============================================================================

/// Capability interface for delegated task execution.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Run the agent once with the given instruction payload.
    ///
    /// A timeout is reported as [`AgentOutcome::TimedOut`], not as an error;
    /// errors mean the process could not be run at all.
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<AgentOutcome, AgentError>;

    /// Can this invoker run in the current environment?
    fn available(&self) -> bool;
}

// ============================================================================
// Claude CLI Agent
// ============================================================================

/// Agent backed by the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    /// Working directory for the agent process.
    project_dir: PathBuf,
    /// Model name passed as `--model`, if set.
    model: Option<String>,
}

/// Binary name of the Claude Code CLI.
const CLAUDE_CLI: &str = "claude";

impl ClaudeAgent {
    /// Create an agent operating in the given project directory.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            model: None,
        }
    }

    /// Set the model passed through to the CLI.
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// The configured model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

#[async_trait]
impl AgentInvoker for ClaudeAgent {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<AgentOutcome, AgentError> {
        let mut args: Vec<&str> = vec!["-p", "--dangerously-skip-permissions"];
        if let Some(ref model) = self.model {
            args.push("--model");
            args.push(model);
        }

        debug!(
            "Running {} ({} chars prompt, timeout {}s)",
            CLAUDE_CLI,
            prompt.len(),
            timeout.as_secs()
        );

        let mut child = match AsyncCommand::new(CLAUDE_CLI)
            .args(&args)
            .current_dir(&self.project_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::CliNotFound {
                    cli: CLAUDE_CLI.to_string(),
                });
            }
            Err(e) => {
                return Err(AgentError::Spawn {
                    message: e.to_string(),
                });
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| AgentError::Io {
                    message: format!("failed to write prompt to stdin: {e}"),
                })?;
            stdin.flush().await.map_err(|e| AgentError::Io {
                message: format!("failed to flush stdin: {e}"),
            })?;
            drop(stdin);
        }

        // wait_with_output takes ownership, so the child cannot be killed
        // explicitly on timeout; tokio reaps it when dropped.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(AgentOutcome::Completed {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(AgentError::Io {
                message: format!("failed to read output: {e}"),
            }),
            Err(_) => Ok(AgentOutcome::TimedOut { timeout }),
        }
    }

    fn available(&self) -> bool {
        which::which(CLAUDE_CLI).is_ok()
    }
}
