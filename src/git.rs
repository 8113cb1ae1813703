//! Git working-tree hygiene.
//!
//! Two best-effort helpers around the project's git repository: detecting
//! leftover uncommitted changes when resuming an interrupted task, and
//! reverting uncommitted changes after a failed or timed-out execution so the
//! next attempt starts from the last committed state. Both tolerate missing
//! git or a non-repository directory - they warn and move on.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Git helper scoped to one project directory.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    project_dir: PathBuf,
}

impl GitWorkspace {
    /// Create a helper for the given project directory.
    #[must_use]
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Check for uncommitted changes (a sign of an interrupted session).
    ///
    /// Returns `false` when git is unavailable or the directory is not a
    /// repository.
    #[must_use]
    pub fn working_tree_dirty(&self) -> bool {
        match self.porcelain_status() {
            Ok(status) => !status.trim().is_empty(),
            Err(e) => {
                debug!("git status unavailable: {}", e);
                false
            }
        }
    }

    /// Revert uncommitted changes after a failed execution.
    ///
    /// Best-effort: failures are logged as warnings and swallowed.
    pub fn rollback(&self) {
        let result = Command::new("git")
            .args(["checkout", "."])
            .current_dir(&self.project_dir)
            .output();

        match result {
            Ok(output) if output.status.success() => {
                debug!("Rolled back uncommitted changes");
            }
            Ok(output) => {
                warn!(
                    "git rollback exited {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("git rollback unavailable: {}", e);
            }
        }
    }

    fn porcelain_status(&self) -> Result<String> {
        let output = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&self.project_dir)
            .output()
            .context("failed to run git status")?;

        if !output.status.success() {
            anyhow::bail!(
                "git status exited {}",
                output.status.code().unwrap_or(-1)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
