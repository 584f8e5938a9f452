//! Engine Configuration
//!
//! Paths and thresholds for one run. Defaults come from `constants`, the
//! environment can override them (`from_env`), and the CLI overrides both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{EngineError, EngineResult};
use crate::logic::confidence::GatePolicy;
use crate::logic::registry_index::LockPolicy;

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root for logs, registry, templates, artifacts and index
    pub data_dir: PathBuf,
    /// Detection window (hours)
    pub window_hours: u64,
    /// Audit (session) window (hours)
    pub audit_window_hours: u64,
    /// Generate without a human at or above this score
    pub approval_threshold: u8,
    /// Manual review band starts here
    pub manual_review_floor: u8,
    /// Block this long for a manual decision (0 = queue and move on)
    pub approval_timeout_secs: u64,
    pub approval_poll_ms: u64,
    /// Pending approvals expire after this many hours
    pub approval_ttl_hours: i64,
    /// Matcher worker cap (0 = available cores)
    pub max_workers: usize,
    pub lock_retries: u32,
    pub lock_backoff_ms: u64,
    pub lock_stale_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR_NAME),
            window_hours: DEFAULT_WINDOW_HOURS,
            audit_window_hours: DEFAULT_AUDIT_WINDOW_HOURS,
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            manual_review_floor: DEFAULT_MANUAL_REVIEW_FLOOR,
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            approval_poll_ms: DEFAULT_APPROVAL_POLL_MS,
            approval_ttl_hours: DEFAULT_APPROVAL_TTL_HOURS,
            max_workers: DEFAULT_MAX_WORKERS,
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_backoff_ms: DEFAULT_LOCK_BACKOFF_MS,
            lock_stale_secs: DEFAULT_LOCK_STALE_SECS,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `INEFFICIENCY_*` environment variables
    pub fn from_env() -> Self {
        Self {
            data_dir: get_data_dir(),
            window_hours: get_window_hours(),
            audit_window_hours: get_audit_window_hours(),
            approval_threshold: get_approval_threshold(),
            manual_review_floor: get_manual_review_floor(),
            approval_timeout_secs: get_approval_timeout_secs(),
            max_workers: get_max_workers(),
            lock_retries: get_lock_retries(),
            ..Default::default()
        }
    }

    /// Same settings rooted somewhere else
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.approval_threshold > 100 {
            return Err(EngineError::config(
                "configuration",
                format!("approval threshold {} is above 100", self.approval_threshold),
            ));
        }
        if self.manual_review_floor > self.approval_threshold {
            return Err(EngineError::config(
                "configuration",
                format!(
                    "manual review floor {} is above the approval threshold {}",
                    self.manual_review_floor, self.approval_threshold
                ),
            ));
        }
        if self.window_hours == 0 || self.audit_window_hours == 0 {
            return Err(EngineError::config("configuration", "window must be at least one hour"));
        }
        Ok(())
    }

    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            approval_threshold: self.approval_threshold,
            manual_review_floor: self.manual_review_floor,
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            retries: self.lock_retries,
            initial_backoff: Duration::from_millis(self.lock_backoff_ms),
            stale_after: Duration::from_secs(self.lock_stale_secs),
        }
    }

    // Paths

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join(EVENT_LOG_FILE)
    }

    pub fn secondary_log_path(&self) -> PathBuf {
        self.data_dir.join(SECONDARY_LOG_FILE)
    }

    pub fn pattern_registry_path(&self) -> PathBuf {
        self.data_dir.join(PATTERN_REGISTRY_FILE)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join(TEMPLATES_DIR)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join(ARTIFACTS_DIR)
    }

    pub fn registry_index_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_INDEX_FILE)
    }

    pub fn audit_history_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_HISTORY_FILE)
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.data_dir.join(CANDIDATES_FILE)
    }

    pub fn approvals_dir(&self) -> PathBuf {
        self.data_dir.join(APPROVALS_DIR)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.approval_threshold, 80);
        assert_eq!(config.manual_review_floor, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = EngineConfig::default().with_data_dir("/tmp/engine");
        assert_eq!(config.registry_index_path(), PathBuf::from("/tmp/engine/skills-index.json"));
        assert_eq!(config.templates_dir(), PathBuf::from("/tmp/engine/templates"));
    }

    #[test]
    fn test_inverted_bands_rejected() {
        let config = EngineConfig {
            manual_review_floor: 90,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_fatal());
    }
}
