//! Plain-text progress log.
//!
//! Each iteration appends a short record (task, outcome, details) to
//! `.autonomy/progress.txt`. The file is capped: once it exceeds the
//! configured line count the oldest lines move to
//! `.autonomy/progress.archive.txt`, so prompts always read a bounded recent
//! tail while nothing is lost.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::store::AUTONOMY_DIR;

/// Progress log file name.
const PROGRESS_FILE: &str = "progress.txt";

/// Archive file receiving rotated-out lines.
const ARCHIVE_FILE: &str = "progress.archive.txt";

/// Append-only progress log with rotation.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    dir: PathBuf,
    max_lines: usize,
}

impl ProgressLog {
    /// Create a log rooted at the given project directory.
    #[must_use]
    pub fn new(project_dir: impl AsRef<Path>, max_lines: usize) -> Self {
        Self {
            dir: project_dir.as_ref().join(AUTONOMY_DIR),
            max_lines,
        }
    }

    /// Path to the live progress file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    /// Path to the archive file.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    /// Append an entry and rotate if the file grew past the cap.
    pub fn append(&self, entry: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .with_context(|| format!("opening {}", self.path().display()))?;
        writeln!(file, "\n{}", entry.trim_end())?;

        self.rotate()
    }

    /// Move overflow lines to the archive, keeping the newest `max_lines`.
    pub fn rotate(&self) -> Result<()> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = contents.lines().collect();
        if lines.len() <= self.max_lines {
            return Ok(());
        }

        let split = lines.len() - self.max_lines;
        let (archived, kept) = lines.split_at(split);

        let mut archive = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.archive_path())
            .with_context(|| format!("opening {}", self.archive_path().display()))?;
        for line in archived {
            writeln!(archive, "{}", line)?;
        }

        let mut kept_text = kept.join("\n");
        kept_text.push('\n');
        fs::write(&path, kept_text)?;

        Ok(())
    }

    /// The last `lines` lines of the live file, for prompt context.
    ///
    /// Returns an empty string when the file does not exist yet.
    #[must_use]
    pub fn tail(&self, lines: usize) -> String {
        let contents = match fs::read_to_string(self.path()) {
            Ok(c) => c,
            Err(_) => return String::new(),
        };

        let all: Vec<&str> = contents.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}
