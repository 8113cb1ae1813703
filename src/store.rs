//! Persistence for the queue document.
//!
//! The document is one JSON file rewritten in full on every mutation. Callers
//! follow a read-modify-write discipline: load, mutate the in-memory
//! [`QueueDocument`], then save. Writes are atomic (tmp file + rename under an
//! exclusive lock) so a crash mid-save never leaves a half-written queue.
//! The external agent may rewrite the same file between our load and save;
//! last-writer-wins is the accepted single-worker contract.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{AutonomyError, Result};
use crate::task::QueueDocument;

/// Directory holding all loop state, relative to the project root.
pub const AUTONOMY_DIR: &str = ".autonomy";

/// Queue document file name.
const QUEUE_FILE: &str = "feature_list.json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// File-backed task store.
#[derive(Debug, Clone)]
pub struct TaskStore {
    /// Directory where queue files are stored (`<project>/.autonomy`).
    dir: PathBuf,
}

impl TaskStore {
    /// Create a store rooted at the given project directory.
    #[must_use]
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: project_dir.as_ref().join(AUTONOMY_DIR),
        }
    }

    /// Path to the queue document.
    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.dir.join(QUEUE_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{QUEUE_FILE}{TMP_SUFFIX}"))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{QUEUE_FILE}{LOCK_SUFFIX}"))
    }

    /// Check whether a queue document exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.queue_path().exists()
    }

    /// Load and parse the queue document.
    ///
    /// # Errors
    ///
    /// - [`AutonomyError::MissingStore`] when the file is absent. The caller
    ///   must not start the loop.
    /// - [`AutonomyError::CorruptStore`] when the file exists but does not
    ///   parse. Corrupt data is never treated as an empty queue.
    pub fn load(&self) -> Result<QueueDocument> {
        let path = self.queue_path();

        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AutonomyError::MissingStore { path });
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents).map_err(|e| AutonomyError::CorruptStore {
            path,
            message: e.to_string(),
        })
    }

    /// Persist the document, refreshing `updated_at`.
    ///
    /// Performs a full rewrite; there is no partial-document patching.
    pub fn save(&self, doc: &mut QueueDocument) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        doc.updated_at = Some(chrono::Utc::now());

        let lock_file = File::create(self.lock_path())?;
        FileExt::lock_exclusive(&lock_file)
            .map_err(|e| AutonomyError::loop_error(format!("Failed to acquire queue lock: {e}")))?;

        let tmp_path = self.tmp_path();
        let json = serde_json::to_string_pretty(doc)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.queue_path())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskStatus};
    use tempfile::TempDir;

    fn test_store() -> (TaskStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = TaskStore::new(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn test_load_missing_store() {
        let (store, _temp_dir) = test_store();
        let err = store.load().unwrap_err();
        assert!(matches!(err, AutonomyError::MissingStore { .. }));
    }

    #[test]
    fn test_load_corrupt_store_is_not_empty_queue() {
        let (store, _temp_dir) = test_store();
        fs::create_dir_all(store.queue_path().parent().unwrap()).unwrap();
        fs::write(store.queue_path(), "{not valid json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, AutonomyError::CorruptStore { .. }));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (store, _temp_dir) = test_store();

        let mut doc = QueueDocument::new();
        doc.features.push(Task::new("A", "first").with_priority(1));
        doc.features
            .push(Task::new("B", "second").with_dependencies(vec!["A".into()]));

        store.save(&mut doc).expect("save should succeed");
        let loaded = store.load().expect("load should succeed");

        assert_eq!(loaded.features.len(), 2);
        assert_eq!(loaded.features[0].id, "A");
        assert_eq!(loaded.features[1].dependencies, vec!["A".to_string()]);
        assert!(loaded.updated_at.is_some());
    }

    #[test]
    fn test_save_refreshes_updated_at() {
        let (store, _temp_dir) = test_store();

        let mut doc = QueueDocument::new();
        store.save(&mut doc).unwrap();
        let first = store.load().unwrap().updated_at.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut doc = store.load().unwrap();
        store.save(&mut doc).unwrap();
        let second = store.load().unwrap().updated_at.unwrap();

        assert!(second > first);
    }

    #[test]
    fn test_save_leaves_no_tmp_file() {
        let (store, _temp_dir) = test_store();
        let mut doc = QueueDocument::new();
        store.save(&mut doc).unwrap();
        assert!(store.queue_path().exists());
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_save_preserves_insertion_order() {
        let (store, _temp_dir) = test_store();

        let mut doc = QueueDocument::new();
        for id in ["C", "A", "B"] {
            doc.features.push(Task::new(id, id));
        }
        doc.features[1].status = TaskStatus::Done;

        store.save(&mut doc).unwrap();
        let loaded = store.load().unwrap();
        let ids: Vec<&str> = loaded.features.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }
}
