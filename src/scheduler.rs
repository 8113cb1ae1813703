//! Task selection.
//!
//! A greedy, single-slot, priority-ordered topological scheduler: it never
//! looks ahead or tries to unblock multiple branches, because exactly one task
//! executes at a time. Selection is pure - no store access, no mutation.
//!
//! Selection order:
//!
//! 1. A task already `in_progress` is always returned first (resume-in-place;
//!    the loop never starts a second concurrent task).
//! 2. Otherwise the `pending` task with the lowest priority whose dependencies
//!    are all `done`, ties broken by document order.

use crate::task::{QueueDocument, Task, TaskStatus};

/// Capability interface for task selection.
///
/// The in-process [`PriorityScheduler`] is the default implementation;
/// alternative selection policies plug in here.
pub trait TaskSource {
    /// Select the next task to work on, or `None` when nothing is eligible.
    fn next<'a>(&self, doc: &'a QueueDocument) -> Option<&'a Task>;
}

/// Dependency-aware priority scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScheduler;

impl PriorityScheduler {
    /// Create a new scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TaskSource for PriorityScheduler {
    fn next<'a>(&self, doc: &'a QueueDocument) -> Option<&'a Task> {
        // Resume an interrupted task before starting anything new. This also
        // enforces the at-most-one-in-progress invariant.
        if let Some(task) = doc.in_progress() {
            return Some(task);
        }

        let done_ids = doc.done_ids();

        // min_by_key keeps the first of equally-prioritized candidates, which
        // is exactly the document-order tie-break.
        doc.features
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && t.dependencies_satisfied(&done_ids))
            .min_by_key(|t| t.priority)
    }
}

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
    fn test_empty_document_yields_none() {
        let scheduler = PriorityScheduler::new();
        assert!(scheduler.next(&QueueDocument::new()).is_none());
    }

    #[test]
    fn test_resumes_in_progress_task() {
        let mut running = Task::new("B", "running").with_priority(50);
        running.status = TaskStatus::InProgress;
        let doc = doc_with(vec![Task::new("A", "cheap").with_priority(0), running]);

        let scheduler = PriorityScheduler::new();
        assert_eq!(scheduler.next(&doc).unwrap().id, "B");
    }

    #[test]
    fn test_dependency_gates_selection() {
        // B has the better priority but depends on A, so A runs first.
        let doc = doc_with(vec![
            Task::new("A", "a").with_priority(1),
            Task::new("B", "b")
                .with_priority(0)
                .with_dependencies(vec!["A".into()]),
        ]);

        let scheduler = PriorityScheduler::new();
        assert_eq!(scheduler.next(&doc).unwrap().id, "A");
    }

    #[test]
    fn test_dependency_released_after_done() {
        let mut a = Task::new("A", "a").with_priority(1);
        a.status = TaskStatus::Done;
        let doc = doc_with(vec![
            a,
            Task::new("B", "b")
                .with_priority(0)
                .with_dependencies(vec!["A".into()]),
        ]);

        let scheduler = PriorityScheduler::new();
        assert_eq!(scheduler.next(&doc).unwrap().id, "B");
    }

    #[test]
    fn test_lowest_priority_wins() {
        let doc = doc_with(vec![
            Task::new("A", "a").with_priority(5),
            Task::new("B", "b").with_priority(2),
            Task::new("C", "c").with_priority(9),
        ]);

        let scheduler = PriorityScheduler::new();
        assert_eq!(scheduler.next(&doc).unwrap().id, "B");
    }

    #[test]
    fn test_document_order_breaks_priority_ties() {
        let doc = doc_with(vec![
            Task::new("first", "x").with_priority(3),
            Task::new("second", "y").with_priority(3),
        ]);

        let scheduler = PriorityScheduler::new();
        assert_eq!(scheduler.next(&doc).unwrap().id, "first");
    }

    #[test]
    fn test_blocked_and_terminal_tasks_never_selected() {
        let mut blocked = Task::new("A", "a");
        blocked.status = TaskStatus::Blocked;
        let mut failed = Task::new("B", "b");
        failed.status = TaskStatus::Failed;
        let mut done = Task::new("C", "c");
        done.status = TaskStatus::Done;
        let doc = doc_with(vec![blocked, failed, done]);

        let scheduler = PriorityScheduler::new();
        assert!(scheduler.next(&doc).is_none());
    }

    #[test]
    fn test_unmet_dependency_on_failed_task_keeps_task_ineligible() {
        let mut failed = Task::new("A", "a");
        failed.status = TaskStatus::Failed;
        let doc = doc_with(vec![
            failed,
            Task::new("B", "b").with_dependencies(vec!["A".into()]),
        ]);

        let scheduler = PriorityScheduler::new();
        assert!(scheduler.next(&doc).is_none());
    }

    #[test]
    fn test_dependency_cycle_degrades_to_no_selection() {
        // A cycle never becomes eligible; that is a degraded state, not a
        // crash.
        let doc = doc_with(vec![
            Task::new("A", "a").with_dependencies(vec!["B".into()]),
            Task::new("B", "b").with_dependencies(vec!["A".into()]),
        ]);

        let scheduler = PriorityScheduler::new();
        assert!(scheduler.next(&doc).is_none());
    }

    #[test]
    fn test_never_selects_task_with_pending_dependency() {
        // Property: a selected task has all dependencies done unless resumed.
        let doc = doc_with(vec![
            Task::new("A", "a"),
            Task::new("B", "b").with_dependencies(vec!["A".into()]),
            Task::new("C", "c").with_dependencies(vec!["A".into(), "B".into()]),
        ]);

        let scheduler = PriorityScheduler::new();
        let selected = scheduler.next(&doc).unwrap();
        let done = doc.done_ids();
        assert!(selected.dependencies_satisfied(&done));
    }
}
