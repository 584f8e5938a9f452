//! Candidate store - the self-update loop, bounded
//!
//! A violation that recurs across enough independent sessions is proposed as a new
//! Pattern Registry rule. Proposals are data in `candidate-patterns.json`;
//! only an explicit approval merges one into the registry file, and a
//! decided candidate is never proposed again.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::history::independent_sessions;
use super::types::{AuditRunRecord, CandidateRule, CandidateStatus, ViolationRule};
use crate::constants::CANDIDATE_RECURRENCE_RUNS;
use crate::error::{EngineError, EngineResult};
use crate::logic::patterns::{append_rule_to_file, PatternRegistry, PatternRule};
use crate::logic::registry_index::{atomic_write_json, LockPolicy, WriterLock};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CandidateDocument {
    #[serde(default)]
    candidates: Vec<CandidateRule>,
}

pub fn candidate_name(violation_id: &str) -> String {
    format!("audit-{}", violation_id)
}

pub struct CandidateStore {
    path: PathBuf,
    lock_policy: LockPolicy,
}

impl CandidateStore {
    pub fn new(path: impl Into<PathBuf>, lock_policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            lock_policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> EngineResult<Vec<CandidateRule>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(&self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let doc: CandidateDocument = serde_json::from_str(&content).map_err(|e| {
            EngineError::config(
                self.path.display().to_string(),
                format!("candidate store does not parse ({}); fix or remove the file", e),
            )
        })?;
        Ok(doc.candidates)
    }

    fn save(&self, candidates: Vec<CandidateRule>) -> EngineResult<()> {
        atomic_write_json(&self.path, &CandidateDocument { candidates })
    }

    /// Propose rules for violations seen in enough independent sessions
    /// (disjoint audited windows). Returns only the candidates added by
    /// this call.
    pub fn propose<'a>(
        &self,
        history: &[AuditRunRecord],
        violation_rules: impl IntoIterator<Item = &'a ViolationRule>,
        registry: &PatternRegistry,
    ) -> EngineResult<Vec<CandidateRule>> {
        let sessions = independent_sessions(history);

        let _lock = WriterLock::acquire(&self.path, &self.lock_policy)?;
        let mut candidates = self.load()?;
        let mut added = Vec::new();

        for violation in violation_rules {
            let runs = sessions.get(violation.id.as_str()).copied().unwrap_or(0);
            if runs < CANDIDATE_RECURRENCE_RUNS {
                continue;
            }

            let name = candidate_name(&violation.id);
            if registry.contains(&name) || candidates.iter().any(|c| c.name() == name) {
                continue;
            }

            let rule = PatternRule::new(
                &name,
                &violation.matcher,
                CANDIDATE_RECURRENCE_RUNS as u32,
                violation.class.severity(),
                &format!("fix-{}", violation.id),
            )
            .with_description(&violation.description);

            log::info!(
                "Proposing candidate rule '{}' ({} seen in {} independent sessions)",
                name,
                violation.id,
                runs
            );

            let candidate = CandidateRule {
                rule,
                violation_id: violation.id.clone(),
                runs_seen: runs,
                proposed_at: Utc::now(),
                status: CandidateStatus::Pending,
                decided_at: None,
            };
            candidates.push(candidate.clone());
            added.push(candidate);
        }

        if !added.is_empty() {
            self.save(candidates)?;
        }
        Ok(added)
    }

    /// Merge a pending candidate into the registry file. Returns the
    /// approved candidate and the new registry version.
    pub fn approve(&self, name: &str, registry_path: &Path) -> EngineResult<(CandidateRule, u32)> {
        let _lock = WriterLock::acquire(&self.path, &self.lock_policy)?;
        let mut candidates = self.load()?;
        let candidate = pending_mut(&mut candidates, name)?;

        let version = append_rule_to_file(registry_path, candidate.rule.clone())?;
        candidate.status = CandidateStatus::Approved;
        candidate.decided_at = Some(Utc::now());
        let approved = candidate.clone();

        self.save(candidates)?;
        log::info!("Candidate '{}' merged into pattern registry v{}", name, version);
        Ok((approved, version))
    }

    pub fn reject(&self, name: &str) -> EngineResult<CandidateRule> {
        let _lock = WriterLock::acquire(&self.path, &self.lock_policy)?;
        let mut candidates = self.load()?;
        let candidate = pending_mut(&mut candidates, name)?;

        candidate.status = CandidateStatus::Rejected;
        candidate.decided_at = Some(Utc::now());
        let rejected = candidate.clone();

        self.save(candidates)?;
        log::info!("Candidate '{}' rejected", name);
        Ok(rejected)
    }
}

fn pending_mut<'a>(candidates: &'a mut [CandidateRule], name: &str) -> EngineResult<&'a mut CandidateRule> {
    let candidate = candidates
        .iter_mut()
        .find(|c| c.name() == name)
        .ok_or_else(|| EngineError::UnknownCandidate(name.to_string()))?;

    match candidate.status {
        CandidateStatus::Pending => Ok(candidate),
        status => Err(EngineError::CandidateDecided {
            name: name.to_string(),
            status: format!("{:?}", status).to_lowercase(),
        }),
    }
}
