//! Artifact Types

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::logic::confidence::{ApprovalKind, ConfidenceAssertion};

/// A generated remediation ("skill") plus the provenance that ties it to
/// the evidence and assertion that produced it.
///
/// Stored as two files in the artifacts directory:
/// - `<id>.md`: the rendered body
/// - `<id>.provenance.json`: everything else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source_pattern: String,
    pub remediation_id: String,
    pub kind: String,
    pub evidence_refs: Vec<String>,
    /// Exact match count; may exceed `evidence_refs.len()`
    #[serde(default)]
    pub occurrence_count: usize,
    /// Set when the matcher capped the retained occurrences
    #[serde(default)]
    pub evidence_refs_truncated: bool,
    pub assertion: ConfidenceAssertion,
    pub approval: ApprovalKind,
    pub registry_version: u32,
    pub registry_digest: String,
    /// sha256 of the body as written
    pub body_sha256: String,
    #[serde(skip)]
    pub body: String,
}

impl Artifact {
    pub fn body_path(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.md", id))
    }

    pub fn provenance_path(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.provenance.json", id))
    }

    /// Read an artifact back from disk
    pub fn load(dir: &Path, id: &str) -> EngineResult<Self> {
        let provenance_path = Self::provenance_path(dir, id);
        let content = fs::read_to_string(&provenance_path).map_err(|e| EngineError::io(&provenance_path, e))?;
        let mut artifact: Artifact = serde_json::from_str(&content)?;

        let body_path = Self::body_path(dir, id);
        artifact.body = fs::read_to_string(&body_path).map_err(|e| EngineError::io(&body_path, e))?;
        Ok(artifact)
    }
}

/// Result of a generate call
#[derive(Debug, Clone)]
pub enum Generation {
    /// Written by this call
    Created(Artifact),
    /// The pattern was already remediated; nothing was touched
    Existing(Artifact),
}

impl Generation {
    pub fn artifact(&self) -> &Artifact {
        match self {
            Generation::Created(a) | Generation::Existing(a) => a,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Generation::Created(_))
    }
}
