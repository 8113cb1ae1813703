//! The run loop controller.
//!
//! Drives iterations over the queue: load the document, pick a task, hand it
//! to the agent, reconcile whatever the agent did to the store, and apply the
//! lifecycle transition the outcome calls for. Terminal failures trigger
//! downstream propagation before the document is persisted.
//!
//! # Outcome precedence
//!
//! The reloaded queue document is the source of truth. If the agent already
//! drove the task to `done` or `failed`, that wins over anything the exit
//! status suggests; exit codes and timeouts only matter when the document
//! still shows the task `in_progress`. A clean exit that left the document
//! unchanged is inconclusive - the task stays `in_progress` and the next
//! iteration resumes it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use tracing::{info, warn};

use crate::agent::{AgentInvoker, AgentOutcome, FailureHint};
use crate::config::AutonomyConfig;
use crate::error::Result;
use crate::git::GitWorkspace;
use crate::lifecycle;
use crate::notify::{Notifier, NotifyEvent};
use crate::progress::ProgressLog;
use crate::prompt::{PromptBuilder, DEFAULT_PROGRESS_TAIL_LINES};
use crate::propagation::propagate;
use crate::scheduler::{PriorityScheduler, TaskSource};
use crate::store::TaskStore;
use crate::task::{StatusCounts, TaskStatus};

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for the loop controller.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Project directory the loop operates in.
    pub project_dir: PathBuf,
    /// Iteration cap; 0 means unlimited.
    pub max_iterations: u32,
    /// Sleep between iterations.
    pub cooldown: Duration,
    /// Per-execution agent timeout.
    pub task_timeout: Duration,
    /// Progress lines fed into each prompt.
    pub progress_tail_lines: usize,
    /// Progress lines kept before rotation.
    pub progress_max_lines: usize,
    /// Revert uncommitted changes after failed executions.
    pub rollback_on_failure: bool,
}

impl LoopConfig {
    /// Create a config for the given project with library defaults.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            max_iterations: 0,
            cooldown: Duration::from_secs(5),
            task_timeout: Duration::from_secs(30 * 60),
            progress_tail_lines: DEFAULT_PROGRESS_TAIL_LINES,
            progress_max_lines: 100,
            rollback_on_failure: true,
        }
    }

    /// Create a config seeded from the loaded project configuration.
    #[must_use]
    pub fn from_project_config(project_dir: impl Into<PathBuf>, config: &AutonomyConfig) -> Self {
        let mut this = Self::new(project_dir);
        this.max_iterations = config.max_iterations;
        this.cooldown = config.cooldown();
        this.task_timeout = config.task_timeout();
        this.progress_max_lines = config.progress_max_lines;
        this
    }

    /// Set the iteration cap (0 = unlimited).
    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the inter-iteration cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the agent execution timeout.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Disable git rollback after failed executions.
    #[must_use]
    pub fn without_rollback(mut self) -> Self {
        self.rollback_on_failure = false;
        self
    }
}

// ============================================================================
// Outcomes and Summary
// ============================================================================

/// How one iteration resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The document shows the task `done`.
    Completed,
    /// The document shows the task `failed` - the agent made the call.
    AgentMarkedFailed,
    /// The execution timed out.
    TimedOut { terminal: bool },
    /// The process exited nonzero or could not run.
    ExecutionFailed { exit_code: i32, terminal: bool },
    /// Clean exit but the document did not resolve the task.
    Unclear,
}

impl IterationOutcome {
    /// Short label for result lines and the progress log.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::AgentMarkedFailed => "FAILED",
            Self::TimedOut { .. } => "TIMEOUT",
            Self::ExecutionFailed { .. } => "ERROR",
            Self::Unclear => "UNCLEAR",
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every task is `done`.
    AllDone,
    /// The scheduler drained without completing everything: blocked, failed,
    /// or dependency-starved work remains.
    NoEligibleTasks,
    /// The iteration cap was reached.
    IterationCap,
}

/// Final report of a loop run.
#[derive(Debug, Clone)]
pub struct LoopSummary {
    /// Iterations actually executed.
    pub iterations: u32,
    /// Task counts at termination.
    pub counts: StatusCounts,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
}

// ============================================================================
// Controller
// ============================================================================

/// Single-slot run loop over the persisted task queue.
pub struct LoopController {
    config: LoopConfig,
    store: TaskStore,
    scheduler: Box<dyn TaskSource>,
    agent: Box<dyn AgentInvoker>,
    notifier: Box<dyn Notifier>,
    progress: ProgressLog,
    git: GitWorkspace,
}

impl LoopController {
    /// Create a controller with the default priority scheduler.
    #[must_use]
    pub fn new(
        config: LoopConfig,
        agent: Box<dyn AgentInvoker>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let store = TaskStore::new(&config.project_dir);
        let progress = ProgressLog::new(&config.project_dir, config.progress_max_lines);
        let git = GitWorkspace::new(&config.project_dir);
        Self {
            config,
            store,
            scheduler: Box::new(PriorityScheduler::new()),
            agent,
            notifier,
            progress,
            git,
        }
    }

    /// Replace the task selection policy.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Box<dyn TaskSource>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Run iterations until the queue drains or the cap is reached.
    ///
    /// # Errors
    ///
    /// Only store-level failures (missing or corrupt queue document, IO)
    /// abort the loop. Agent timeouts and process failures are absorbed into
    /// per-task retry bookkeeping.
    pub async fn run(&mut self) -> Result<LoopSummary> {
        if !self.agent.available() {
            warn!("Agent CLI not found on PATH; executions will fail until it is installed");
        }

        // Structural invariants are advisory: a planner bug should be loud
        // but must not strand an otherwise workable queue.
        if let Err(violations) = self.store.load()?.validate() {
            for violation in &violations {
                warn!("Queue document invariant violation: {}", violation);
            }
        }

        let mut iterations = 0u32;
        let stop_reason = loop {
            if self.config.max_iterations > 0 && iterations >= self.config.max_iterations {
                println!(
                    "\nMax iterations ({}) reached. Stopping.",
                    self.config.max_iterations
                );
                break StopReason::IterationCap;
            }

            let doc = self.store.load()?;
            let Some(task) = self.scheduler.next(&doc) else {
                break self.report_drained(&doc).await;
            };

            iterations += 1;
            let task_id = task.id.clone();
            let task_title = task.title.clone();
            let resuming = task.status == TaskStatus::InProgress;
            let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");

            println!("\n--- Iteration {} | {} ---", iterations, timestamp);
            println!("  Task: {} - {}", task_id.bold(), task_title);

            let prompt = PromptBuilder::new(task)
                .with_progress_tail(self.progress.tail(self.config.progress_tail_lines))
                .build();

            if resuming {
                if self.git.working_tree_dirty() {
                    println!(
                        "  {} Uncommitted changes detected from possibly interrupted session",
                        "Warning:".yellow().bold()
                    );
                }
            } else {
                let mut doc = doc;
                lifecycle::mark_in_progress(&mut doc, &task_id)
                    .map_err(|e| crate::error::AutonomyError::loop_error(e.to_string()))?;
                self.store.save(&mut doc)?;
            }

            self.progress.append(&format!(
                "=== Iteration {} | {} ===\nTask: {} - {}\nStatus: STARTED",
                iterations, timestamp, task_id, task_title
            ))?;

            let outcome = match self.agent.invoke(&prompt, self.config.task_timeout).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Launch failures drive the same retry path as a nonzero
                    // exit.
                    warn!("Agent invocation failed: {}", e);
                    AgentOutcome::Completed {
                        exit_code: -1,
                        stdout: String::new(),
                        stderr: e.to_string(),
                    }
                }
            };

            let result = self.reconcile(&task_id, &task_title, &outcome).await?;
            self.print_result(&task_id, &result);

            if self.config.cooldown > Duration::ZERO {
                tokio::time::sleep(self.config.cooldown).await;
            }
        };

        let counts = self.store.load()?.counts();
        println!(
            "\nAutonomy loop finished: {}/{} tasks done, {} failed, {} blocked.",
            counts.done,
            counts.total(),
            counts.failed,
            counts.blocked
        );

        Ok(LoopSummary {
            iterations,
            counts,
            stop_reason,
        })
    }

    /// Reload the store and apply the transition the outcome calls for.
    async fn reconcile(
        &mut self,
        task_id: &str,
        task_title: &str,
        outcome: &AgentOutcome,
    ) -> Result<IterationOutcome> {
        // The agent may have rewritten the queue; its view wins.
        let mut doc = self.store.load()?;
        let current_status = doc.get(task_id).map(|t| t.status);

        let result = match current_status {
            Some(TaskStatus::Done) => {
                self.notifier
                    .notify(
                        NotifyEvent::TaskDone,
                        &format!("Task {} ({}) completed", task_id, task_title),
                    )
                    .await;
                IterationOutcome::Completed
            }
            Some(TaskStatus::Failed) => {
                let blocked = propagate(&mut doc, task_id);
                self.store.save(&mut doc)?;
                self.notifier
                    .notify(
                        NotifyEvent::TaskFailed,
                        &format!("Task {} ({}) failed", task_id, task_title),
                    )
                    .await;
                if !blocked.is_empty() {
                    println!("  Blocked downstream: {}", blocked.join(", "));
                }
                IterationOutcome::AgentMarkedFailed
            }
            Some(TaskStatus::InProgress) => {
                // Document unchanged; fall back to the execution signal.
                self.apply_execution_signal(&mut doc, task_id, task_title, outcome)
                    .await?
            }
            other => {
                // The agent moved the task somewhere else (e.g. back to
                // pending after its own bookkeeping). Trust it.
                info!(
                    "Task {} reconciled externally to {:?}; no transition applied",
                    task_id, other
                );
                IterationOutcome::Unclear
            }
        };

        debug_assert!(
            self.store.load()?.counts().in_progress <= 1,
            "single in-progress invariant violated"
        );

        Ok(result)
    }

    /// Apply timeout / exit-code fallback transitions to an unchanged task.
    async fn apply_execution_signal(
        &mut self,
        doc: &mut crate::task::QueueDocument,
        task_id: &str,
        task_title: &str,
        outcome: &AgentOutcome,
    ) -> Result<IterationOutcome> {
        match outcome {
            AgentOutcome::TimedOut { timeout } => {
                let disposition = lifecycle::record_timeout(doc, task_id)
                    .map_err(|e| crate::error::AutonomyError::loop_error(e.to_string()))?;
                let terminal = disposition.is_terminal();
                if terminal {
                    propagate(doc, task_id);
                }
                self.store.save(doc)?;

                if self.config.rollback_on_failure {
                    self.git.rollback();
                }
                self.progress.append(&format!(
                    "Task: {}\nStatus: TIMEOUT\nDetails: exceeded {}s\n===",
                    task_id,
                    timeout.as_secs()
                ))?;

                let event = if terminal {
                    NotifyEvent::TaskFailed
                } else {
                    NotifyEvent::TaskTimeout
                };
                self.notifier
                    .notify(
                        event,
                        &format!("Task {} ({}) timed out", task_id, task_title),
                    )
                    .await;

                Ok(IterationOutcome::TimedOut { terminal })
            }
            AgentOutcome::Completed {
                exit_code, stderr, ..
            } if *exit_code != 0 => {
                let hint = FailureHint::from_stderr(stderr);
                info!(
                    "Agent exited {} for task {} ({})",
                    exit_code, task_id, hint
                );

                let disposition = lifecycle::record_failure(doc, task_id)
                    .map_err(|e| crate::error::AutonomyError::loop_error(e.to_string()))?;
                let terminal = disposition.is_terminal();
                if terminal {
                    propagate(doc, task_id);
                }
                self.store.save(doc)?;

                if self.config.rollback_on_failure {
                    self.git.rollback();
                }
                self.progress.append(&format!(
                    "Task: {}\nStatus: ERROR\nDetails: exit code {} ({})\n===",
                    task_id, exit_code, hint
                ))?;

                if terminal {
                    self.notifier
                        .notify(
                            NotifyEvent::TaskFailed,
                            &format!("Task {} ({}) failed after {}", task_id, task_title, hint),
                        )
                        .await;
                }

                Ok(IterationOutcome::ExecutionFailed {
                    exit_code: *exit_code,
                    terminal,
                })
            }
            AgentOutcome::Completed { .. } => {
                // Clean exit, task still in progress: inconclusive. The next
                // iteration resumes the task.
                Ok(IterationOutcome::Unclear)
            }
        }
    }

    /// Termination handling when the scheduler yields nothing.
    async fn report_drained(&self, doc: &crate::task::QueueDocument) -> StopReason {
        let counts = doc.counts();
        if counts.done == counts.total() {
            println!("\nAll tasks completed!");
            self.notifier
                .notify(NotifyEvent::AllDone, "All tasks completed")
                .await;
            StopReason::AllDone
        } else {
            println!(
                "\nNo eligible tasks remain ({} pending, {} blocked, {} failed). Stopping.",
                counts.pending, counts.blocked, counts.failed
            );
            StopReason::NoEligibleTasks
        }
    }

    fn print_result(&self, task_id: &str, outcome: &IterationOutcome) {
        let label = match outcome {
            IterationOutcome::Completed => outcome.label().green().bold(),
            IterationOutcome::Unclear => outcome.label().yellow(),
            _ => outcome.label().red().bold(),
        };
        match outcome {
            IterationOutcome::TimedOut { terminal: true }
            | IterationOutcome::ExecutionFailed { terminal: true, .. } => {
                println!("  Result: {} (max attempts reached, task failed)", label);
            }
            IterationOutcome::ExecutionFailed {
                exit_code,
                terminal: false,
            } => {
                println!("  Result: {} (exit code {}, will retry)", label, exit_code);
            }
            IterationOutcome::TimedOut { terminal: false } => {
                println!("  Result: {} (will retry)", label);
            }
            _ => println!("  Result: {}", label),
        }
        info!("Iteration result for {}: {}", task_id, outcome.label());
    }

    /// The project directory this controller operates in.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.config.project_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_defaults() {
        let config = LoopConfig::new(".");
        assert_eq!(config.max_iterations, 0);
        assert_eq!(config.cooldown, Duration::from_secs(5));
        assert_eq!(config.task_timeout, Duration::from_secs(1800));
        assert!(config.rollback_on_failure);
    }

    #[test]
    fn test_loop_config_from_project_config() {
        let project = AutonomyConfig {
            task_timeout_minutes: 10,
            cooldown_seconds: 0,
            max_iterations: 7,
            ..Default::default()
        };
        let config = LoopConfig::from_project_config(".", &project);
        assert_eq!(config.task_timeout, Duration::from_secs(600));
        assert_eq!(config.cooldown, Duration::ZERO);
        assert_eq!(config.max_iterations, 7);
    }

    #[test]
    fn test_loop_config_builders() {
        let config = LoopConfig::new(".")
            .with_max_iterations(3)
            .with_cooldown(Duration::ZERO)
            .with_task_timeout(Duration::from_secs(60))
            .without_rollback();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.cooldown, Duration::ZERO);
        assert_eq!(config.task_timeout, Duration::from_secs(60));
        assert!(!config.rollback_on_failure);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(IterationOutcome::Completed.label(), "COMPLETED");
        assert_eq!(IterationOutcome::AgentMarkedFailed.label(), "FAILED");
        assert_eq!(IterationOutcome::TimedOut { terminal: false }.label(), "TIMEOUT");
        assert_eq!(
            IterationOutcome::ExecutionFailed {
                exit_code: 1,
                terminal: true
            }
            .label(),
            "ERROR"
        );
        assert_eq!(IterationOutcome::Unclear.label(), "UNCLEAR");
    }
}
