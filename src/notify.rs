//! Notification hooks.
//!
//! The loop emits `(event, task, message)` signals at task completion,
//! terminal failure, timeout, and queue drain. Delivery is a capability
//! interface: the default [`LogNotifier`] writes structured log lines, and
//! [`CommandNotifier`] hands events to an explicitly configured executable
//! (`notify_command` in the config). A missing or failing notifier degrades
//! to a warning - notification trouble never affects the loop.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{info, warn};

/// Bound on notifier command execution.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Kinds of loop events surfaced to notifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    /// A task reached `done`.
    TaskDone,
    /// A task failed terminally.
    TaskFailed,
    /// An execution timed out (task may still retry).
    TaskTimeout,
    /// The queue drained with every task done.
    AllDone,
}

impl NotifyEvent {
    /// Stable event name passed to external commands.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::TaskDone => "task_done",
            Self::TaskFailed => "task_failed",
            Self::TaskTimeout => "task_timeout",
            Self::AllDone => "all_done",
        }
    }
}

impl std::fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Capability interface for event delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event. Implementations swallow their own failures.
    async fn notify(&self, event: NotifyEvent, message: &str);
}

/// Default notifier: events become structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Create a log notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotifyEvent, message: &str) {
        info!(event = event.wire_name(), "{}", message);
    }
}

/// Notifier that runs a configured executable as `<cmd> <event> <message>`.
///
/// The command comes from configuration, never from probing the filesystem
/// for helper scripts. Execution is bounded and failures are logged, not
/// propagated.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    /// Create a notifier around the given executable.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The configured command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, event: NotifyEvent, message: &str) {
        let result = tokio::time::timeout(
            NOTIFY_TIMEOUT,
            AsyncCommand::new(&self.command)
                .arg(event.wire_name())
                .arg(message)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {}
            Ok(Ok(output)) => {
                warn!(
                    "Notify command {} exited {} for event {}",
                    self.command,
                    output.status.code().unwrap_or(-1),
                    event
                );
            }
            Ok(Err(e)) => {
                warn!("Notify command {} unavailable: {}", self.command, e);
            }
            Err(_) => {
                warn!(
                    "Notify command {} timed out after {}s",
                    self.command,
                    NOTIFY_TIMEOUT.as_secs()
                );
            }
        }
    }
}

/// Build the notifier selected by configuration.
#[must_use]
pub fn notifier_from_config(notify_command: Option<&str>) -> Box<dyn Notifier> {
    match notify_command {
        Some(cmd) => Box::new(CommandNotifier::new(cmd)),
        None => Box::new(LogNotifier::new()),
    }
}
