//! Atomic file replacement and the cross-process writer lock
//!
//! Every persisted document (index, registry, artifacts, candidates) is
//! replaced through `atomic_write`: write a sibling temp file, fsync,
//! rename over the canonical path. The rename is the only irreversible step.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// ============================================================================
// ATOMIC WRITE
// ============================================================================

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let nonce: u32 = rand::thread_rng().gen();
    path.with_file_name(format!(".{}.{}.{:08x}.tmp", file_name, std::process::id(), nonce))
}

/// Replace `path` with `bytes` so readers only ever see the old or the new
/// content, never a torn file
pub fn atomic_write(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
    }

    let tmp = temp_path_for(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(EngineError::io(path, e));
    }

    Ok(())
}

/// Serialize as pretty JSON and write atomically
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    atomic_write(path, &json)
}

// ============================================================================
// WRITER LOCK
// ============================================================================

/// Retry policy for acquiring the writer lock
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            retries: crate::constants::DEFAULT_LOCK_RETRIES,
            initial_backoff: Duration::from_millis(crate::constants::DEFAULT_LOCK_BACKOFF_MS),
            stale_after: Duration::from_secs(crate::constants::DEFAULT_LOCK_STALE_SECS),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockOwner {
    pid: u32,
    host: String,
    acquired_at: String,
}

/// Exclusive lock file next to a document. Released on drop.
pub struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    pub fn lock_path_for(document: &Path) -> PathBuf {
        let mut name = document
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        document.with_file_name(name)
    }

    /// Acquire the lock for `document`, retrying with jittered exponential
    /// backoff. Gives up with `RegistryWriteConflict`.
    pub fn acquire(document: &Path, policy: &LockPolicy) -> EngineResult<Self> {
        let lock_path = Self::lock_path_for(document);
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
            }
        }

        let attempts = policy.retries.max(1);
        let mut backoff = policy.initial_backoff;
        let mut attempt = 0;
        let mut broke_stale = false;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut file) => {
                    let owner = LockOwner {
                        pid: std::process::id(),
                        host: hostname::get()
                            .map(|h| h.to_string_lossy().into_owned())
                            .unwrap_or_else(|_| "unknown".to_string()),
                        acquired_at: chrono::Utc::now().to_rfc3339(),
                    };
                    if let Ok(json) = serde_json::to_string(&owner) {
                        let _ = file.write_all(json.as_bytes());
                    }
                    return Ok(Self { path: lock_path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    // One stale break per acquisition, then back to normal retries
                    if !broke_stale && is_stale(&lock_path, policy.stale_after) {
                        log::warn!("Breaking stale lock {:?}", lock_path);
                        let _ = fs::remove_file(&lock_path);
                        broke_stale = true;
                        continue;
                    }

                    attempt += 1;
                    if attempt >= attempts {
                        break;
                    }

                    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2 + 1);
                    log::debug!(
                        "Lock {:?} busy (attempt {}/{}), retrying in {:?}",
                        lock_path,
                        attempt,
                        attempts,
                        backoff
                    );
                    std::thread::sleep(backoff + Duration::from_millis(jitter));
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(EngineError::io(&lock_path, e)),
            }
        }

        Err(EngineError::RegistryWriteConflict {
            path: document.to_path_buf(),
            lock: lock_path,
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}

fn is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let temp_dir = TempDir::new().unwrap();
        let doc = temp_dir.path().join("index.json");
        let policy = LockPolicy {
            retries: 2,
            initial_backoff: Duration::from_millis(1),
            stale_after: Duration::from_secs(3600),
        };

        let lock = WriterLock::acquire(&doc, &policy).unwrap();
        assert!(lock.path().exists());

        let second = WriterLock::acquire(&doc, &policy);
        assert!(matches!(second, Err(EngineError::RegistryWriteConflict { .. })));

        drop(lock);
        assert!(WriterLock::acquire(&doc, &policy).is_ok());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let temp_dir = TempDir::new().unwrap();
        let doc = temp_dir.path().join("index.json");
        fs::write(WriterLock::lock_path_for(&doc), "{}").unwrap();

        let policy = LockPolicy {
            retries: 1,
            initial_backoff: Duration::from_millis(1),
            stale_after: Duration::ZERO,
        };

        std::thread::sleep(Duration::from_millis(10));
        assert!(WriterLock::acquire(&doc, &policy).is_ok());
    }
}
