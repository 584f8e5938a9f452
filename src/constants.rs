//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every default can be overridden from the environment; the `get_*`
//! helpers fall back to the constant when the variable is missing or
//! unparsable.

use std::path::PathBuf;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Inefficiency Engine";

/// Data directory name under the platform data dir
pub const DATA_DIR_NAME: &str = "inefficiency-engine";

// ============================================
// File layout (relative to the data directory)
// ============================================

pub const EVENT_LOG_FILE: &str = "history.jsonl";
pub const SECONDARY_LOG_FILE: &str = "tool-calls.jsonl";
pub const PATTERN_REGISTRY_FILE: &str = "patterns.yaml";
pub const TEMPLATES_DIR: &str = "templates";
pub const ARTIFACTS_DIR: &str = "skills";
pub const REGISTRY_INDEX_FILE: &str = "skills-index.json";
pub const AUDIT_HISTORY_FILE: &str = "audit-history.jsonl";
pub const CANDIDATES_FILE: &str = "candidate-patterns.json";
pub const APPROVALS_DIR: &str = "approvals";

// ============================================
// Detection defaults
// ============================================

/// Default detection window (hours)
pub const DEFAULT_WINDOW_HOURS: u64 = 24;

/// Default audit (session) window (hours)
pub const DEFAULT_AUDIT_WINDOW_HOURS: u64 = 1;

/// Score required to generate an artifact without a human
pub const DEFAULT_APPROVAL_THRESHOLD: u8 = 80;

/// Lowest score still surfaced for manual approval
pub const DEFAULT_MANUAL_REVIEW_FLOOR: u8 = 60;

/// How long a run waits for a manual decision (seconds, 0 = do not wait)
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 0;

/// How long a pending manual approval stays open (hours)
pub const DEFAULT_APPROVAL_TTL_HOURS: i64 = 72;

/// Poll interval while waiting for a manual decision (milliseconds)
pub const DEFAULT_APPROVAL_POLL_MS: u64 = 500;

/// Upper bound on matcher worker threads (0 = available cores)
pub const DEFAULT_MAX_WORKERS: usize = 0;

// ============================================
// Registry Index locking
// ============================================

/// Attempts at acquiring the index lock before giving up
pub const DEFAULT_LOCK_RETRIES: u32 = 8;

/// First backoff delay (milliseconds), doubled on each retry
pub const DEFAULT_LOCK_BACKOFF_MS: u64 = 25;

/// Locks older than this are considered abandoned (seconds)
pub const DEFAULT_LOCK_STALE_SECS: u64 = 120;

// ============================================
// Feedback loop
// ============================================

/// Independent audit sessions (disjoint windows) a violation must recur in before it is proposed
pub const CANDIDATE_RECURRENCE_RUNS: usize = 3;

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Resolve the data directory: `INEFFICIENCY_HOME` or the platform data dir
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("INEFFICIENCY_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Get detection window from environment or use default
pub fn get_window_hours() -> u64 {
    env_parse("INEFFICIENCY_WINDOW_HOURS").unwrap_or(DEFAULT_WINDOW_HOURS)
}

/// Get audit session window from environment or use default
pub fn get_audit_window_hours() -> u64 {
    env_parse("INEFFICIENCY_AUDIT_WINDOW_HOURS").unwrap_or(DEFAULT_AUDIT_WINDOW_HOURS)
}

/// Get approval threshold from environment or use default
pub fn get_approval_threshold() -> u8 {
    env_parse::<u8>("INEFFICIENCY_APPROVAL_THRESHOLD")
        .filter(|v| *v <= 100)
        .unwrap_or(DEFAULT_APPROVAL_THRESHOLD)
}

/// Get manual review floor from environment or use default
pub fn get_manual_review_floor() -> u8 {
    env_parse::<u8>("INEFFICIENCY_MANUAL_REVIEW_FLOOR")
        .filter(|v| *v <= 100)
        .unwrap_or(DEFAULT_MANUAL_REVIEW_FLOOR)
}

/// Get manual approval timeout from environment or use default
pub fn get_approval_timeout_secs() -> u64 {
    env_parse("INEFFICIENCY_APPROVAL_TIMEOUT_SECS").unwrap_or(DEFAULT_APPROVAL_TIMEOUT_SECS)
}

/// Get matcher worker cap from environment or use default
pub fn get_max_workers() -> usize {
    env_parse("INEFFICIENCY_MAX_WORKERS").unwrap_or(DEFAULT_MAX_WORKERS)
}

/// Get lock retry count from environment or use default
pub fn get_lock_retries() -> u32 {
    env_parse("INEFFICIENCY_LOCK_RETRIES").unwrap_or(DEFAULT_LOCK_RETRIES)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
