//! Configuration for the autonomy loop.
//!
//! Loaded from `.autonomy/config.json`. Every field is optional; an absent
//! file yields defaults. A present-but-corrupt file is an error, consistent
//! with the store's rule that corrupt data is never silently ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{AutonomyError, Result};
use crate::store::AUTONOMY_DIR;

/// Config file name inside the autonomy directory.
const CONFIG_FILE: &str = "config.json";

fn default_timeout_minutes() -> u64 {
    30
}

fn default_progress_max_lines() -> usize {
    100
}

fn default_cooldown_seconds() -> u64 {
    5
}

/// Loop configuration loaded from `.autonomy/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Per-execution timeout for the agent, in minutes.
    #[serde(default = "default_timeout_minutes")]
    pub task_timeout_minutes: u64,

    /// Progress log lines kept before rotation to the archive file.
    #[serde(default = "default_progress_max_lines")]
    pub progress_max_lines: usize,

    /// Seconds to sleep between loop iterations.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Iteration cap; 0 means unlimited.
    #[serde(default)]
    pub max_iterations: u32,

    /// Model name passed through to the agent CLI (e.g. "opus", "sonnet").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Executable invoked for notifications as `<cmd> <event> <message>`.
    /// Unset means notifications go to the structured log only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<String>,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            task_timeout_minutes: default_timeout_minutes(),
            progress_max_lines: default_progress_max_lines(),
            cooldown_seconds: default_cooldown_seconds(),
            max_iterations: 0,
            model: None,
            notify_command: None,
        }
    }
}

impl AutonomyConfig {
    /// Load configuration from `<project>/.autonomy/config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`AutonomyError::Config`] when the file exists but fails to
    /// parse. An absent file is not an error.
    pub fn load(project_dir: impl AsRef<Path>) -> Result<Self> {
        let path = project_dir.as_ref().join(AUTONOMY_DIR).join(CONFIG_FILE);

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map_err(|e| AutonomyError::config_with_path(e.to_string(), path))
    }

    /// The agent execution timeout as a [`Duration`].
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_minutes * 60)
    }

    /// The inter-iteration cooldown as a [`Duration`].
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}
