//! Failure propagation.
//!
//! When a task fails terminally, everything that depends on it - directly or
//! transitively through other newly blocked tasks - can never become eligible.
//! Rather than leaving those tasks silently unschedulable, propagation marks
//! them `blocked` with a `blocked_reason` naming the root failure, so the
//! queue records why downstream work was skipped.
//!
//! Only `pending` tasks are touched: work that already finished, is running,
//! or was blocked earlier is left as-is. Running propagation twice with the
//! same failed id yields the same document.

use std::collections::HashSet;

use tracing::debug;

use crate::task::{QueueDocument, TaskStatus};

/// Block every pending task downstream of `failed_id`.
///
/// Returns the ids newly blocked by this call, in document order; an empty
/// vector when nothing changed (including repeat invocations).
pub fn propagate(doc: &mut QueueDocument, failed_id: &str) -> Vec<String> {
    // The blocking set grows as tasks get blocked: a pending task whose
    // dependency is in the set can never run, so it joins the set itself.
    let mut blocking: HashSet<String> = HashSet::new();
    blocking.insert(failed_id.to_string());

    // Tasks blocked by an earlier propagation of the same root also carry
    // the cascade, which is what makes repeat calls converge identically.
    for task in &doc.features {
        if task.status == TaskStatus::Blocked {
            blocking.insert(task.id.clone());
        }
    }

    let mut newly_blocked = Vec::new();
    loop {
        let mut changed = false;
        for task in &mut doc.features {
            if task.status != TaskStatus::Pending {
                continue;
            }
            if task.dependencies.iter().any(|d| blocking.contains(d)) {
                task.status = TaskStatus::Blocked;
                task.blocked_reason = Some(format!("dependency {} failed", failed_id));
                blocking.insert(task.id.clone());
                newly_blocked.push(task.id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    if !newly_blocked.is_empty() {
        debug!(
            "Failure of {} blocked {} downstream task(s): {}",
            failed_id,
            newly_blocked.len(),
            newly_blocked.join(", ")
        );
    }

    newly_blocked
}
