//! Data directory scaffolding and helpers usable without an open engine

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::logic::approval::FileApprovalQueue;
use crate::logic::artifact::{default_templates, TemplateStore};
use crate::logic::audit::CandidateStore;
use crate::logic::config::EngineConfig;
use crate::logic::patterns::{default_document, write_document};
use crate::logic::registry_index::atomic_write;

// ============================================================================
// HELPERS
// ============================================================================

/// File-backed approval queue for a configuration
pub fn approval_queue(config: &EngineConfig) -> FileApprovalQueue {
    FileApprovalQueue::new(
        config.approvals_dir(),
        Duration::from_secs(config.approval_timeout_secs),
        Duration::from_millis(config.approval_poll_ms),
        chrono::Duration::hours(config.approval_ttl_hours),
    )
}

/// Candidate store for a configuration (usable without opening an engine)
pub fn candidate_store(config: &EngineConfig) -> CandidateStore {
    CandidateStore::new(config.candidates_path(), config.lock_policy())
}

/// Scaffold a data directory: default registry and templates. Existing
/// files are left alone. Returns the files created.
pub fn init_data_dir(config: &EngineConfig) -> EngineResult<Vec<PathBuf>> {
    let mut created = Vec::new();

    for dir in [config.data_dir().to_path_buf(), config.templates_dir(), config.artifacts_dir()] {
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
    }

    let registry_path = config.pattern_registry_path();
    if !registry_path.exists() {
        write_document(&registry_path, &default_document())?;
        created.push(registry_path);
    }

    for (kind, source) in default_templates() {
        let path = TemplateStore::new(config.templates_dir()).path_for(kind);
        if !path.exists() {
            atomic_write(&path, source.as_bytes())?;
            created.push(path);
        }
    }

    log::info!("Initialized {:?} ({} file(s) created)", config.data_dir(), created.len());
    Ok(created)
}
