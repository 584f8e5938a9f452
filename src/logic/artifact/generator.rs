//! Artifact Generator
//!
//! Writes at most one artifact per pattern. Generation for one pattern is
//! serialized twice over: a process-wide mutex keyed by pattern name, and
//! the cross-process index lock, which is held from the "already
//! remediated?" check until the index entry is written.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::template::{Field, FieldMap, TemplateStore};
use super::types::{Artifact, Generation};
use crate::error::{EngineError, EngineResult};
use crate::logic::confidence::ApprovedAssertion;
use crate::logic::patterns::{EvidenceSet, PatternRegistry, PatternRule};
use crate::logic::registry_index::{atomic_write, atomic_write_json, IndexEntry, RegistryIndex, RegistryUpdater};

// ============================================================================
// STATE
// ============================================================================

static PATTERN_LOCKS: Lazy<Mutex<HashMap<String, Arc<Mutex<()>>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn pattern_lock(pattern_name: &str) -> Arc<Mutex<()>> {
    PATTERN_LOCKS
        .lock()
        .entry(pattern_name.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Everything the generator needs to know about one detection
pub struct GenerationRequest<'a> {
    pub approved: &'a ApprovedAssertion,
    pub rule: &'a PatternRule,
    pub evidence: &'a EvidenceSet,
    pub registry: &'a PatternRegistry,
}

pub struct ArtifactGenerator {
    artifacts_dir: PathBuf,
    templates: TemplateStore,
    updater: RegistryUpdater,
}

impl ArtifactGenerator {
    pub fn new(artifacts_dir: impl Into<PathBuf>, templates: TemplateStore, updater: RegistryUpdater) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            templates,
            updater,
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Artifact already registered for a pattern, if any
    pub fn existing(&self, pattern_name: &str) -> EngineResult<Option<Artifact>> {
        let index = self.updater.read()?;
        match index.find_by_pattern(pattern_name) {
            Some(entry) => Artifact::load(&self.artifacts_dir, &entry.artifact_id).map(Some),
            None => Ok(None),
        }
    }

    /// Generate the artifact for an approved assertion, or return the one
    /// that already exists for its pattern unchanged.
    pub fn generate(&self, request: &GenerationRequest<'_>) -> EngineResult<Generation> {
        let pattern_name = request.approved.pattern_name();
        let keyed = pattern_lock(pattern_name);
        let _serial = keyed.lock();

        // Cheap path without touching the lock file
        if let Some(artifact) = self.existing(pattern_name)? {
            log::info!("Pattern '{}' already remediated by '{}'", pattern_name, artifact.id);
            return Ok(Generation::Existing(artifact));
        }

        let kind = &request.rule.kind;
        let template = self
            .templates
            .load(kind)?
            .ok_or_else(|| EngineError::TemplateUnavailable {
                pattern: pattern_name.to_string(),
                kind: kind.clone(),
                path: self.templates.path_for(kind),
            })?;

        let lock = self.updater.lock()?;
        let index = self.updater.read()?;

        // Another process may have finished while we waited for the lock
        if let Some(entry) = index.find_by_pattern(pattern_name) {
            let artifact = Artifact::load(&self.artifacts_dir, &entry.artifact_id)?;
            return Ok(Generation::Existing(artifact));
        }

        let id = self.allocate_id(&request.rule.remediation_id, &index);
        let created_at = Utc::now();
        let fields = build_fields(request, &id, created_at);

        let body = template.render(&fields).map_err(|placeholder| EngineError::IncompleteGeneration {
            pattern: pattern_name.to_string(),
            kind: kind.clone(),
            placeholder,
        })?;

        let evidence_refs = request.evidence.event_ids();
        let evidence_refs_truncated = evidence_refs.len() < request.evidence.count;
        if evidence_refs_truncated {
            log::warn!(
                "Pattern '{}': provenance lists {} of {} occurrences",
                pattern_name,
                evidence_refs.len(),
                request.evidence.count
            );
        }

        let artifact = Artifact {
            id: id.clone(),
            created_at,
            source_pattern: pattern_name.to_string(),
            remediation_id: request.rule.remediation_id.clone(),
            kind: kind.clone(),
            evidence_refs,
            occurrence_count: request.evidence.count,
            evidence_refs_truncated,
            assertion: request.approved.assertion().clone(),
            approval: request.approved.approval().clone(),
            registry_version: request.registry.version(),
            registry_digest: request.registry.digest().to_string(),
            body_sha256: hex::encode(Sha256::digest(body.as_bytes())),
            body,
        };

        let body_path = Artifact::body_path(&self.artifacts_dir, &id);
        let provenance_path = Artifact::provenance_path(&self.artifacts_dir, &id);

        let written = atomic_write(&body_path, artifact.body.as_bytes())
            .and_then(|_| atomic_write_json(&provenance_path, &artifact))
            .and_then(|_| {
                self.updater.append_locked(
                    &lock,
                    IndexEntry {
                        artifact_id: id.clone(),
                        pattern_name: pattern_name.to_string(),
                        created_at,
                    },
                )
            });

        if let Err(e) = written {
            // Files without an index entry would shadow the next attempt
            let _ = fs::remove_file(&body_path);
            let _ = fs::remove_file(&provenance_path);
            return Err(e);
        }

        log::info!(
            "Generated artifact '{}' for pattern '{}' (confidence {})",
            id,
            pattern_name,
            artifact.assertion.score
        );
        Ok(Generation::Created(artifact))
    }

    /// Slug of the remediation id, suffixed when another pattern already
    /// owns it or a stray file sits at the path
    fn allocate_id(&self, remediation_id: &str, index: &RegistryIndex) -> String {
        let base = slugify(remediation_id);
        let taken = |id: &str| {
            index.find_by_artifact(id).is_some()
                || Artifact::body_path(&self.artifacts_dir, id).exists()
                || Artifact::provenance_path(&self.artifacts_dir, id).exists()
        };

        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "artifact".to_string()
    } else {
        slug.to_string()
    }
}

fn build_fields(request: &GenerationRequest<'_>, id: &str, created_at: DateTime<Utc>) -> FieldMap {
    let rule = request.rule;
    let evidence = request.evidence;
    let assertion = request.approved.assertion();

    let factors = assertion
        .contributing_factors
        .iter()
        .map(|(name, points)| format!("- {}: {:+}", name, points))
        .collect::<Vec<_>>()
        .join("\n");

    let occurrences = evidence
        .occurrences
        .iter()
        .map(|o| {
            let at = DateTime::<Utc>::from_timestamp_millis(o.timestamp)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| o.timestamp.to_string());
            format!("- `{}` at {}: {}", o.event_id, at, o.excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let description = if rule.description.is_empty() {
        format!("Remediation for recurring pattern `{}`.", rule.name)
    } else {
        rule.description.clone()
    };

    let mut fields = FieldMap::new();
    fields.insert(Field::PatternName, rule.name.clone());
    fields.insert(Field::ArtifactId, id.to_string());
    fields.insert(Field::RemediationId, rule.remediation_id.clone());
    fields.insert(Field::Severity, rule.severity.to_string());
    fields.insert(Field::Description, description);
    fields.insert(Field::Matcher, rule.matcher.clone());
    fields.insert(Field::Threshold, rule.threshold.to_string());
    fields.insert(Field::OccurrenceCount, evidence.count.to_string());
    fields.insert(Field::Confidence, assertion.score.to_string());
    fields.insert(Field::ConfidenceFactors, factors);
    fields.insert(Field::Evidence, occurrences);
    fields.insert(Field::EvidenceRefs, evidence.event_ids().join(", "));
    fields.insert(Field::CreatedAt, created_at.to_rfc3339_opts(SecondsFormat::Secs, true));
    fields.insert(Field::RegistryVersion, request.registry.version().to_string());
    fields
}
