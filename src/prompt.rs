//! Instruction payload generation.
//!
//! Builds the prompt handed to the agent for one task execution: the task
//! itself, its retry position, a tail of the progress log for continuity, and
//! the protocol the agent is expected to follow (update the queue document,
//! append to the progress log, commit).

use crate::task::Task;

/// How many trailing progress-log lines go into the prompt by default.
pub const DEFAULT_PROGRESS_TAIL_LINES: usize = 20;

/// Builder for the per-task instruction payload.
#[derive(Debug, Clone)]
pub struct PromptBuilder<'a> {
    task: &'a Task,
    progress_tail: String,
}

impl<'a> PromptBuilder<'a> {
    /// Start a prompt for the given task.
    #[must_use]
    pub fn new(task: &'a Task) -> Self {
        Self {
            task,
            progress_tail: String::new(),
        }
    }

    /// Attach recent progress-log lines.
    #[must_use]
    pub fn with_progress_tail(mut self, tail: impl Into<String>) -> Self {
        self.progress_tail = tail.into();
        self
    }

    /// Render the full instruction payload.
    #[must_use]
    pub fn build(&self) -> String {
        let task = self.task;
        let deps = if task.dependencies.is_empty() {
            "none".to_string()
        } else {
            task.dependencies.join(", ")
        };
        let progress = if self.progress_tail.trim().is_empty() {
            "(no prior progress recorded)"
        } else {
            self.progress_tail.trim_end()
        };

        format!(
            "You are an autonomous shift worker. Follow the Autonomy Protocol strictly.\n\
             \n\
             ## Current Task\n\
             Task {id}: {title}\n\
             Description: {description}\n\
             Dependencies: {deps}\n\
             Attempt: {attempt}/{max_attempts}\n\
             \n\
             ## Recent Progress\n\
             {progress}\n\
             \n\
             ## Instructions\n\
             1. Read .autonomy/progress.txt for full context\n\
             2. Read .autonomy/feature_list.json for task details\n\
             3. Read .autonomy/config.json for project settings\n\
             4. Execute the task above, following its description\n\
             5. Verify your work (run tests/lint if configured)\n\
             6. Update feature_list.json: set status to \"done\", set completed_at\n\
             7. Append a completion summary to progress.txt\n\
             8. Git commit with format: feat({id}): {title}\n\
             \n\
             If the task fails, increment attempt_count. If attempt_count >= max_attempts, \
             set status to \"failed\".\n\
             If blocked by dependencies, set status to \"blocked\" and record the blocker.\n",
            id = task.id,
            title = task.title,
            description = task.description,
            deps = deps,
            attempt = task.attempt_count + 1,
            max_attempts = task.max_attempts,
        )
    }
}
