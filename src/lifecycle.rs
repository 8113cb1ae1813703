//! Per-task lifecycle transitions.
//!
//! The transition functions operate on a borrowed in-memory
//! [`QueueDocument`]; persisting the result is the caller's job. Each
//! execution outcome increments `attempt_count` exactly once, and a task
//! reaches `failed` only when that counter hits `max_attempts` - below the
//! ceiling a failed execution returns the task to `pending` for retry.
//!
//! Timeouts share the failure branching and differ only in how the outcome is
//! reported.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::task::{QueueDocument, TaskStatus};

/// Invalid lifecycle operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The task id does not exist in the document.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// The task is not in a state that allows the requested transition.
    #[error("Cannot move task {id} from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Another task already holds the single in-progress slot.
    #[error("Task {other} is already in progress; cannot start {id}")]
    SlotOccupied { id: String, other: String },
}

/// How a non-success execution outcome was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Nonzero exit or launch failure.
    Failure,
    /// The execution exceeded the configured timeout.
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of recording a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Attempts remain; the task went back to `pending`.
    Retrying { attempt: u32, max: u32 },
    /// The attempt ceiling was reached; the task is terminally `failed`.
    Terminal { attempt: u32 },
}

impl FailureDisposition {
    /// Did this failure become terminal?
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}

/// Move a task into `in_progress`, recording `assigned_at`.
///
/// Accepts `pending` and (externally unblocked) `blocked` tasks. Exactly one
/// task may hold the in-progress slot; the scheduler preserves this by
/// resuming an existing in-progress task instead of starting a new one.
///
/// # Errors
///
/// Returns a [`TransitionError`] if the task is unknown, already terminal, or
/// the slot is occupied by a different task.
pub fn mark_in_progress(doc: &mut QueueDocument, id: &str) -> Result<(), TransitionError> {
    if let Some(other) = doc.in_progress() {
        if other.id != id {
            return Err(TransitionError::SlotOccupied {
                id: id.to_string(),
                other: other.id.clone(),
            });
        }
        // Resuming is a no-op; assigned_at keeps the original claim time.
        return Ok(());
    }

    let task = doc
        .get_mut(id)
        .ok_or_else(|| TransitionError::TaskNotFound { id: id.to_string() })?;

    match task.status {
        TaskStatus::Pending | TaskStatus::Blocked => {
            task.status = TaskStatus::InProgress;
            task.assigned_at = Some(Utc::now());
            task.blocked_reason = None;
            debug!("Task {} marked in_progress", id);
            Ok(())
        }
        from => Err(TransitionError::InvalidTransition {
            id: id.to_string(),
            from,
            to: TaskStatus::InProgress,
        }),
    }
}

/// Move an `in_progress` task to `done`, recording `completed_at`.
///
/// Called only when the persisted document confirms completion; the core
/// never infers success from an exit code alone.
///
/// # Errors
///
/// Returns a [`TransitionError`] if the task is unknown or not in progress.
pub fn mark_done(doc: &mut QueueDocument, id: &str) -> Result<(), TransitionError> {
    let task = doc
        .get_mut(id)
        .ok_or_else(|| TransitionError::TaskNotFound { id: id.to_string() })?;

    if task.status != TaskStatus::InProgress {
        return Err(TransitionError::InvalidTransition {
            id: id.to_string(),
            from: task.status,
            to: TaskStatus::Done,
        });
    }

    task.status = TaskStatus::Done;
    task.completed_at = Some(Utc::now());
    info!("Task {} completed", id);
    Ok(())
}

/// Record a failed execution: retry below the attempt ceiling, fail at it.
///
/// # Errors
///
/// Returns a [`TransitionError`] if the task is unknown or not in progress.
pub fn record_failure(
    doc: &mut QueueDocument,
    id: &str,
) -> Result<FailureDisposition, TransitionError> {
    record_unsuccessful(doc, id, FailureKind::Failure)
}

/// Record a timed-out execution.
///
/// Branching is identical to [`record_failure`]; only the outcome
/// classification differs.
///
/// # Errors
///
/// Returns a [`TransitionError`] if the task is unknown or not in progress.
pub fn record_timeout(
    doc: &mut QueueDocument,
    id: &str,
) -> Result<FailureDisposition, TransitionError> {
    record_unsuccessful(doc, id, FailureKind::Timeout)
}

fn record_unsuccessful(
    doc: &mut QueueDocument,
    id: &str,
    kind: FailureKind,
) -> Result<FailureDisposition, TransitionError> {
    let task = doc
        .get_mut(id)
        .ok_or_else(|| TransitionError::TaskNotFound { id: id.to_string() })?;

    if task.status != TaskStatus::InProgress {
        return Err(TransitionError::InvalidTransition {
            id: id.to_string(),
            from: task.status,
            to: TaskStatus::Failed,
        });
    }

    task.attempt_count += 1;

    if task.attempts_exhausted() {
        task.status = TaskStatus::Failed;
        info!(
            "Task {} failed terminally after {} ({} of {} attempts)",
            id, kind, task.attempt_count, task.max_attempts
        );
        Ok(FailureDisposition::Terminal {
            attempt: task.attempt_count,
        })
    } else {
        task.status = TaskStatus::Pending;
        info!(
            "Task {} will retry after {} (attempt {} of {})",
            id, kind, task.attempt_count, task.max_attempts
        );
        Ok(FailureDisposition::Retrying {
            attempt: task.attempt_count,
            max: task.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn doc_with(tasks: Vec<Task>) -> QueueDocument {
        QueueDocument {
            features: tasks,
            updated_at: None,
        }
    }

    #[test]
    fn test_mark_in_progress_sets_assigned_at() {
        let mut doc = doc_with(vec![Task::new("A", "a")]);
        mark_in_progress(&mut doc, "A").unwrap();

        let task = doc.get("A").unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.assigned_at.is_some());
    }

    #[test]
    fn test_mark_in_progress_from_blocked_clears_reason() {
        let mut task = Task::new("A", "a");
        task.status = TaskStatus::Blocked;
        task.blocked_reason = Some("dependency X failed".into());
        let mut doc = doc_with(vec![task]);

        mark_in_progress(&mut doc, "A").unwrap();
        let task = doc.get("A").unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.blocked_reason.is_none());
    }

    #[test]
    fn test_mark_in_progress_rejects_second_task() {
        let mut doc = doc_with(vec![Task::new("A", "a"), Task::new("B", "b")]);
        mark_in_progress(&mut doc, "A").unwrap();

        let err = mark_in_progress(&mut doc, "B").unwrap_err();
        assert_eq!(
            err,
            TransitionError::SlotOccupied {
                id: "B".into(),
                other: "A".into()
            }
        );
    }

    #[test]
    fn test_mark_in_progress_resume_is_noop() {
        let mut doc = doc_with(vec![Task::new("A", "a")]);
        mark_in_progress(&mut doc, "A").unwrap();
        let first_assigned = doc.get("A").unwrap().assigned_at;

        mark_in_progress(&mut doc, "A").unwrap();
        assert_eq!(doc.get("A").unwrap().assigned_at, first_assigned);
    }

    #[test]
    fn test_mark_in_progress_rejects_done_task() {
        let mut task = Task::new("A", "a");
        task.status = TaskStatus::Done;
        let mut doc = doc_with(vec![task]);

        let err = mark_in_progress(&mut doc, "A").unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn test_mark_done_sets_completed_at() {
        let mut doc = doc_with(vec![Task::new("A", "a")]);
        mark_in_progress(&mut doc, "A").unwrap();
        mark_done(&mut doc, "A").unwrap();

        let task = doc.get("A").unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_mark_done_requires_in_progress() {
        let mut doc = doc_with(vec![Task::new("A", "a")]);
        let err = mark_done(&mut doc, "A").unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn test_record_failure_below_ceiling_retries() {
        let mut doc = doc_with(vec![Task::new("A", "a").with_max_attempts(3)]);
        mark_in_progress(&mut doc, "A").unwrap();

        let disposition = record_failure(&mut doc, "A").unwrap();
        assert_eq!(disposition, FailureDisposition::Retrying { attempt: 1, max: 3 });

        let task = doc.get("A").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, 1);
    }

    #[test]
    fn test_record_failure_at_ceiling_is_terminal() {
        let mut doc = doc_with(vec![Task::new("A", "a").with_max_attempts(3)]);

        for expected_attempt in 1..=3 {
            mark_in_progress(&mut doc, "A").unwrap();
            let disposition = record_failure(&mut doc, "A").unwrap();
            assert_eq!(disposition.is_terminal(), expected_attempt == 3);
        }

        let task = doc.get("A").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempt_count, 3);
    }

    #[test]
    fn test_record_timeout_matches_failure_branching() {
        let mut doc = doc_with(vec![Task::new("A", "a").with_max_attempts(1)]);
        mark_in_progress(&mut doc, "A").unwrap();

        let disposition = record_timeout(&mut doc, "A").unwrap();
        assert_eq!(disposition, FailureDisposition::Terminal { attempt: 1 });
        assert_eq!(doc.get("A").unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn test_record_failure_increments_exactly_once() {
        let mut doc = doc_with(vec![Task::new("A", "a").with_max_attempts(5)]);
        mark_in_progress(&mut doc, "A").unwrap();
        record_failure(&mut doc, "A").unwrap();
        assert_eq!(doc.get("A").unwrap().attempt_count, 1);

        // A second record without a new execution is rejected: the task is no
        // longer in progress.
        let err = record_failure(&mut doc, "A").unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
        assert_eq!(doc.get("A").unwrap().attempt_count, 1);
    }

    #[test]
    fn test_unknown_task_is_rejected() {
        let mut doc = QueueDocument::new();
        assert!(matches!(
            mark_in_progress(&mut doc, "ghost").unwrap_err(),
            TransitionError::TaskNotFound { .. }
        ));
        assert!(matches!(
            record_failure(&mut doc, "ghost").unwrap_err(),
            TransitionError::TaskNotFound { .. }
        ));
    }
}
