//! Error handling
//!
//! Every variant carries the pattern/artifact it concerns and renders a
//! message that tells the operator what to fix.

use std::path::PathBuf;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // Per-pattern generation errors (recoverable - skipped and reported)
    #[error("template '{kind}' unavailable for pattern '{pattern}': add {path:?} or change the rule's kind")]
    TemplateUnavailable {
        pattern: String,
        kind: String,
        path: PathBuf,
    },

    #[error("incomplete generation for pattern '{pattern}': placeholder {{{{{placeholder}}}}} left after rendering template '{kind}': fix the template or the evidence value carrying it")]
    IncompleteGeneration {
        pattern: String,
        kind: String,
        placeholder: String,
    },

    // Registry index contention (recoverable - retried with backoff)
    #[error("registry index {path:?} is locked by another writer after {attempts} attempts: retry later or remove a stale lock at {lock:?}")]
    RegistryWriteConflict {
        path: PathBuf,
        lock: PathBuf,
        attempts: u32,
    },

    // Startup errors (fatal)
    #[error("invalid configuration in {source_name}: {message}")]
    ConfigInvalid { source_name: String, message: String },

    // Command errors
    #[error("unknown pattern '{0}': check the name against the pattern registry")]
    UnknownPattern(String),

    #[error("pattern '{pattern}' was not detected in the current window")]
    NotDetected { pattern: String },

    #[error("pattern '{pattern}' already remediated by artifact '{artifact_id}'")]
    AlreadyRemediated { pattern: String, artifact_id: String },

    #[error("pattern '{pattern}' scored {score} which is below the approval threshold {threshold}")]
    BelowGate {
        pattern: String,
        score: u8,
        threshold: u8,
    },

    #[error("no pending approval for '{0}': run generate or cycle to queue it first")]
    NoPendingApproval(String),

    #[error("unknown candidate '{0}': list candidates to see proposed rules")]
    UnknownCandidate(String),

    #[error("candidate '{name}' was already {status}; candidates are decided once")]
    CandidateDecided { name: String, status: String },

    // Generic errors
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Only configuration errors abort a run
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ConfigInvalid { .. })
    }

    /// Failures of the storage layer that callers treat as hard failures
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigInvalid { .. }
                | EngineError::Io { .. }
                | EngineError::Serialization(_)
                | EngineError::RegistryWriteConflict { .. }
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
