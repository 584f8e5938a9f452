//! Registry Index + Registry Updater
//!
//! The index is the single source of truth for "has this pattern already
//! been remediated". It only ever grows, and each growth is a full
//! read-modify-write-rename cycle under the writer lock.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::atomic::{atomic_write_json, LockPolicy, WriterLock};
use crate::error::{EngineError, EngineResult};

// ============================================================================
// INDEX DOCUMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub artifact_id: String,
    pub pattern_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryIndex {
    /// Bumped on every successful append
    pub revision: u64,
    pub entries: Vec<IndexEntry>,
}

impl RegistryIndex {
    /// Missing file = empty index. A file that does not parse is a
    /// configuration error: nothing may be appended on top of it.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(EngineError::io(path, e)),
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            EngineError::config(
                path.display().to_string(),
                format!("registry index does not parse ({}); restore it from version control before generating", e),
            )
        })
    }

    pub fn find_by_pattern(&self, pattern_name: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.pattern_name == pattern_name)
    }

    pub fn find_by_artifact(&self, artifact_id: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.artifact_id == artifact_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_entry(&self, entry: IndexEntry) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self {
            revision: self.revision + 1,
            entries,
        }
    }
}

// ============================================================================
// UPDATER
// ============================================================================

/// Sole writer of the Registry Index
#[derive(Debug, Clone)]
pub struct RegistryUpdater {
    path: PathBuf,
    lock_policy: LockPolicy,
}

impl RegistryUpdater {
    pub fn new(path: impl Into<PathBuf>, lock_policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            lock_policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> EngineResult<RegistryIndex> {
        RegistryIndex::load(&self.path)
    }

    /// Exclusive access to the index across threads and processes
    pub fn lock(&self) -> EngineResult<WriterLock> {
        WriterLock::acquire(&self.path, &self.lock_policy)
    }

    /// Append while already holding the writer lock
    pub fn append_locked(&self, _lock: &WriterLock, entry: IndexEntry) -> EngineResult<RegistryIndex> {
        let current = self.read()?;

        if let Some(existing) = current.find_by_pattern(&entry.pattern_name) {
            return Err(EngineError::AlreadyRemediated {
                pattern: entry.pattern_name.clone(),
                artifact_id: existing.artifact_id.clone(),
            });
        }

        let updated = current.with_entry(entry);
        atomic_write_json(&self.path, &updated)?;

        log::info!(
            "Registry index {:?} now at revision {} ({} entries)",
            self.path,
            updated.revision,
            updated.len()
        );
        Ok(updated)
    }

    /// Lock, append one entry, unlock
    pub fn append(&self, entry: IndexEntry) -> EngineResult<RegistryIndex> {
        let lock = self.lock()?;
        self.append_locked(&lock, entry)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(artifact: &str, pattern: &str) -> IndexEntry {
        IndexEntry {
            artifact_id: artifact.to_string(),
            pattern_name: pattern.to_string(),
            created_at: Utc::now(),
        }
    }

    fn updater(dir: &TempDir) -> RegistryUpdater {
        RegistryUpdater::new(
            dir.path().join("skills-index.json"),
            LockPolicy {
                retries: 50,
                initial_backoff: Duration::from_millis(1),
                stale_after: Duration::from_secs(3600),
            },
        )
    }

    #[test]
    fn test_missing_index_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = updater(&dir).read().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.revision, 0);
    }

    #[test]
    fn test_append_grows_by_one() {
        let dir = TempDir::new().unwrap();
        let updater = updater(&dir);

        updater.append(entry("batch-file-reads", "repeated-file-reads")).unwrap();
        let index = updater.append(entry("act-without-asking", "unnecessary-confirmation")).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.revision, 2);
        assert_eq!(updater.read().unwrap(), index);
        assert!(!WriterLock::lock_path_for(updater.path()).exists());
    }

    #[test]
    fn test_duplicate_pattern_rejected() {
        let dir = TempDir::new().unwrap();
        let updater = updater(&dir);

        updater.append(entry("a", "p")).unwrap();
        let err = updater.append(entry("b", "p")).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRemediated { .. }));
        assert_eq!(updater.read().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_index_is_config_error() {
        let dir = TempDir::new().unwrap();
        let updater = updater(&dir);
        fs::write(updater.path(), "{ torn").unwrap();

        let err = updater.read().unwrap_err();
        assert!(err.is_fatal());
    }
}
