//! Autonomy - unattended task queue execution with Claude Code.
//!
//! An external loop driver that repeatedly selects a task from a persisted
//! JSON queue (`.autonomy/feature_list.json`), delegates its execution to the
//! Claude Code CLI, and reconciles the agent's side effects against the
//! queue's state machine. Terminal failures cascade to dependent tasks so
//! nothing downstream is skipped silently.
//!
//! # Architecture
//!
//! ```text
//! LoopController (runloop)
//!   ├── TaskStore (store)          - load/save of the queue document
//!   ├── TaskSource (scheduler)     - dependency-aware next-task selection
//!   ├── lifecycle                  - status transitions + attempt accounting
//!   ├── propagation                - cascade terminal failures downstream
//!   ├── AgentInvoker (agent)       - claude CLI subprocess with timeout
//!   ├── PromptBuilder (prompt)     - instruction payload per execution
//!   ├── ProgressLog (progress)     - append/rotate/tail of progress.txt
//!   ├── Notifier (notify)          - task_done / task_failed / ... hooks
//!   └── GitWorkspace (git)         - resume warnings and failure rollback
//! ```
//!
//! Exactly one task is in progress at a time; the queue document is the
//! source of truth for execution outcomes, with exit codes as fallback.
//!
//! # Example
//!
//! ```rust,ignore
//! use autonomy::agent::ClaudeAgent;
//! use autonomy::config::AutonomyConfig;
//! use autonomy::notify::notifier_from_config;
//! use autonomy::runloop::{LoopConfig, LoopController};
//!
//! let config = AutonomyConfig::load(".")?;
//! let loop_config = LoopConfig::from_project_config(".", &config);
//! let agent = Box::new(ClaudeAgent::new(".").with_model(config.model.clone()));
//! let notifier = notifier_from_config(config.notify_command.as_deref());
//!
//! let mut controller = LoopController::new(loop_config, agent, notifier);
//! let summary = controller.run().await?;
//! println!("{} iterations", summary.iterations);
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod notify;
pub mod progress;
pub mod prompt;
pub mod propagation;
pub mod runloop;
pub mod scheduler;
pub mod store;
pub mod task;

// Re-export commonly used types
pub use error::{AutonomyError, Result};

pub use agent::{AgentInvoker, AgentOutcome, ClaudeAgent};
pub use config::AutonomyConfig;
pub use lifecycle::{FailureDisposition, FailureKind, TransitionError};
pub use notify::{Notifier, NotifyEvent};
pub use propagation::propagate;
pub use runloop::{IterationOutcome, LoopConfig, LoopController, LoopSummary, StopReason};
pub use scheduler::{PriorityScheduler, TaskSource};
pub use store::TaskStore;
pub use task::{QueueDocument, StatusCounts, Task, TaskStatus};
