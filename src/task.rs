//! Task queue data model.
//!
//! The queue document is a single JSON file (`.autonomy/feature_list.json`)
//! holding an ordered list of tasks plus a document-level timestamp. Tasks are
//! created by an external planner; this crate only mutates status and
//! bookkeeping fields in place and never deletes entries - terminal tasks stay
//! in the document for audit and for dependency lookups.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──start──> InProgress ──agent/outcome──> Done
//!    ▲                    │                        Failed (attempt_count >= max_attempts)
//!    │                    │
//!    └────────retry───────┘
//!
//! Pending ──upstream failure──> Blocked
//! ```
//!
//! `Done`, `Failed` and `Blocked` are terminal for the automatic loop; only
//! external intervention reopens them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Priority assigned to tasks that carry none in the document.
///
/// Matches the planner convention of sorting unprioritized work last.
pub const DEFAULT_PRIORITY: i64 = 999;

/// Default attempt ceiling for tasks that carry none in the document.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Task Status
// ============================================================================

/// Status of a single task in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for scheduling once dependencies are done.
    #[default]
    Pending,
    /// Currently delegated to the agent. At most one task holds this status.
    InProgress,
    /// Completed successfully (terminal).
    Done,
    /// Failed after exhausting attempts (terminal).
    Failed,
    /// An upstream dependency failed (terminal for the automatic loop).
    Blocked,
}

impl TaskStatus {
    /// Is this a terminal state for the automatic loop?
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Blocked)
    }

    /// Can the loop still make progress on a task in this state?
    #[must_use]
    pub fn is_workable(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Task
// ============================================================================

/// A unit of work with dependency, status and retry metadata.
///
/// Unknown fields in the persisted JSON are ignored on load so that planner
/// extensions never break the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, stable for the task's lifetime.
    pub id: String,
    /// Short human-readable title. Opaque to the core.
    #[serde(default)]
    pub title: String,
    /// Longer description. Opaque to the core.
    #[serde(default)]
    pub description: String,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Ids of tasks that must reach `done` before this one is eligible.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Scheduling priority; lower runs first.
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Executions that ended in failure or timeout so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// Ceiling on `attempt_count` before the task fails terminally.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Set when the task transitions to `in_progress`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    /// Set when the task transitions to `done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Which upstream failure blocked this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Task {
    /// Create a fresh pending task.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            priority: DEFAULT_PRIORITY,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            assigned_at: None,
            completed_at: None,
            blocked_reason: None,
        }
    }

    /// Builder method to set dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Builder method to set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set the attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Check whether every dependency id is in the given done set.
    #[must_use]
    pub fn dependencies_satisfied(&self, done_ids: &HashSet<&str>) -> bool {
        self.dependencies.iter().all(|d| done_ids.contains(d.as_str()))
    }

    /// Has this task used up its attempt budget?
    #[must_use]
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.id, self.title)
    }
}

// ============================================================================
// Queue Document
// ============================================================================

/// Count of tasks by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl StatusCounts {
    /// Total number of tasks.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.failed + self.blocked
    }
}

/// The full persisted collection of tasks plus document metadata.
///
/// Insertion order is preserved and used as the scheduling tie-break.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueDocument {
    /// Ordered task list. Named `features` on disk for planner compatibility.
    #[serde(default)]
    pub features: Vec<Task>,
    /// Refreshed on every persisted mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QueueDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a task by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.features.iter().find(|t| t.id == id)
    }

    /// Look up a task by id, mutably.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.features.iter_mut().find(|t| t.id == id)
    }

    /// Ids of all tasks currently `done`.
    #[must_use]
    pub fn done_ids(&self) -> HashSet<&str> {
        self.features
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id.as_str())
            .collect()
    }

    /// The task currently `in_progress`, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<&Task> {
        self.features
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
    }

    /// Count tasks by status.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.features {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Done => counts.done += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }

    /// True when every task is in a terminal state.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.features.iter().all(|t| t.status.is_terminal())
    }

    /// Tasks that are neither terminal nor in progress.
    #[must_use]
    pub fn remaining(&self) -> Vec<&Task> {
        self.features
            .iter()
            .filter(|t| !t.status.is_terminal())
            .collect()
    }

    /// Validate structural invariants: unique ids and no self-dependencies.
    ///
    /// # Errors
    ///
    /// Returns a list of human-readable violations, empty on success.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut violations = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for task in &self.features {
            *seen.entry(task.id.as_str()).or_insert(0) += 1;
            if task.dependencies.iter().any(|d| *d == task.id) {
                violations.push(format!("task {} depends on itself", task.id));
            }
        }
        for (id, count) in seen {
            if count > 1 {
                violations.push(format!("duplicate task id: {} ({} entries)", id, count));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(tasks: Vec<Task>) -> QueueDocument {
        QueueDocument {
            features: tasks,
            updated_at: None,
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let status: TaskStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(status, TaskStatus::Blocked);
    }

    #[test]
    fn test_status_terminal_classification() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Blocked.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_task_parses_with_unknown_fields() {
        let json = r#"{
            "id": "T1",
            "title": "Add parser",
            "status": "pending",
            "acceptance_criteria": ["compiles", "tests pass"],
            "estimated_hours": 4
        }"#;
        let task: Task = serde_json::from_str(json).expect("unknown fields must not fail");
        assert_eq!(task.id, "T1");
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert_eq!(task.attempt_count, 0);
        assert_eq!(task.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_task_defaults_on_minimal_entry() {
        let task: Task = serde_json::from_str(r#"{"id": "T1"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.dependencies.is_empty());
        assert!(task.assigned_at.is_none());
        assert!(task.blocked_reason.is_none());
    }

    #[test]
    fn test_dependencies_satisfied() {
        let task = Task::new("B", "b").with_dependencies(vec!["A".into()]);
        let mut done = HashSet::new();
        assert!(!task.dependencies_satisfied(&done));
        done.insert("A");
        assert!(task.dependencies_satisfied(&done));
    }

    #[test]
    fn test_empty_dependencies_always_satisfied() {
        let task = Task::new("A", "a");
        assert!(task.dependencies_satisfied(&HashSet::new()));
    }

    #[test]
    fn test_attempts_exhausted() {
        let mut task = Task::new("A", "a").with_max_attempts(2);
        assert!(!task.attempts_exhausted());
        task.attempt_count = 2;
        assert!(task.attempts_exhausted());
    }

    #[test]
    fn test_document_lookup_and_done_ids() {
        let mut a = Task::new("A", "a");
        a.status = TaskStatus::Done;
        let doc = doc_with(vec![a, Task::new("B", "b")]);

        assert!(doc.get("A").is_some());
        assert!(doc.get("missing").is_none());
        assert_eq!(doc.done_ids(), HashSet::from(["A"]));
    }

    #[test]
    fn test_document_counts() {
        let mut a = Task::new("A", "a");
        a.status = TaskStatus::Done;
        let mut b = Task::new("B", "b");
        b.status = TaskStatus::InProgress;
        let doc = doc_with(vec![a, b, Task::new("C", "c")]);

        let counts = doc.counts();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_validate_detects_duplicates_and_self_deps() {
        let doc = doc_with(vec![
            Task::new("A", "first"),
            Task::new("A", "second"),
            Task::new("B", "b").with_dependencies(vec!["B".into()]),
        ]);

        let violations = doc.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.contains("duplicate task id: A")));
        assert!(violations.iter().any(|v| v.contains("B depends on itself")));
    }

    #[test]
    fn test_validate_accepts_clean_document() {
        let doc = doc_with(vec![
            Task::new("A", "a"),
            Task::new("B", "b").with_dependencies(vec!["A".into()]),
        ]);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_document_round_trips() {
        let mut task = Task::new("A", "a").with_priority(1);
        task.status = TaskStatus::InProgress;
        task.assigned_at = Some(Utc::now());
        let doc = doc_with(vec![task]);

        let json = serde_json::to_string_pretty(&doc).unwrap();
        let parsed: QueueDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.features.len(), 1);
        assert_eq!(parsed.features[0].status, TaskStatus::InProgress);
        assert_eq!(parsed.features[0].priority, 1);
        assert!(parsed.features[0].assigned_at.is_some());
    }
}
