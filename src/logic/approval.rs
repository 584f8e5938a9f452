//! Manual Approval
//!
//! Assertions in the manual review band wait for a human. The file queue
//! keeps one request per pattern under `approvals/pending/` and reads the
//! operator's verdict from `approvals/decisions/`. A request that expires
//! or times out is discarded, never approved.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::logic::confidence::{ApprovedAssertion, ConfidenceAssertion, GatePolicy};
use crate::logic::registry_index::atomic_write_json;

// ============================================================================
// TYPES
// ============================================================================

/// Waiting request for one pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub pattern_name: String,
    pub assertion: ConfidenceAssertion,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected,
}

/// Operator verdict on a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub pattern_name: String,
    pub verdict: Verdict,
    pub approver: String,
    pub decided_at: DateTime<Utc>,
    /// Inherited from the request; a rejection holds until then
    pub expires_at: DateTime<Utc>,
}

/// What the gate did with an assertion
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    Approved(ApprovedAssertion),
    Rejected { approver: String },
    /// Request recorded, no verdict yet
    Pending { expires_at: DateTime<Utc> },
    /// Waited the full timeout without a verdict; request discarded
    TimedOut,
}

/// Decides assertions from the manual review band
pub trait ApprovalGate: Send + Sync {
    fn request(&self, assertion: ConfidenceAssertion, policy: &GatePolicy) -> EngineResult<ApprovalOutcome>;
}

// ============================================================================
// FILE QUEUE
// ============================================================================

pub struct FileApprovalQueue {
    root: PathBuf,
    /// How long `request` blocks for a verdict (zero = do not wait)
    timeout: Duration,
    poll_interval: Duration,
    ttl: chrono::Duration,
}

impl FileApprovalQueue {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration, poll_interval: Duration, ttl: chrono::Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
            poll_interval,
            ttl,
        }
    }

    fn pending_path(&self, pattern_name: &str) -> PathBuf {
        self.root.join("pending").join(format!("{}.json", pattern_name))
    }

    fn decision_path(&self, pattern_name: &str) -> PathBuf {
        self.root.join("decisions").join(format!("{}.json", pattern_name))
    }

    /// Live (unexpired) requests, oldest first. Expired ones are removed.
    pub fn pending(&self) -> EngineResult<Vec<ApprovalRequest>> {
        let dir = self.root.join("pending");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(&dir, e)),
        };

        let now = Utc::now();
        let mut live = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<ApprovalRequest>(&path)? {
                Some(req) if req.is_expired(now) => {
                    log::warn!("Approval request for '{}' expired; discarded", req.pattern_name);
                    self.clear(&req.pattern_name);
                }
                Some(req) => live.push(req),
                None => {}
            }
        }

        live.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(live)
    }

    /// Record an operator verdict for a live request
    pub fn decide(&self, pattern_name: &str, verdict: Verdict, approver: &str) -> EngineResult<ApprovalDecision> {
        let request = self
            .live_request(pattern_name, Utc::now())?
            .ok_or_else(|| EngineError::NoPendingApproval(pattern_name.to_string()))?;

        let decision = ApprovalDecision {
            pattern_name: pattern_name.to_string(),
            verdict,
            approver: approver.to_string(),
            decided_at: Utc::now(),
            expires_at: request.expires_at,
        };
        atomic_write_json(&self.decision_path(pattern_name), &decision)?;

        log::info!("Pattern '{}' {:?} by {}", pattern_name, verdict, approver);
        Ok(decision)
    }

    fn live_request(&self, pattern_name: &str, now: DateTime<Utc>) -> EngineResult<Option<ApprovalRequest>> {
        match read_json::<ApprovalRequest>(&self.pending_path(pattern_name))? {
            Some(req) if req.is_expired(now) => {
                log::warn!("Approval request for '{}' expired; discarded", pattern_name);
                self.clear(pattern_name);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn live_decision(&self, pattern_name: &str, now: DateTime<Utc>) -> EngineResult<Option<ApprovalDecision>> {
        match read_json::<ApprovalDecision>(&self.decision_path(pattern_name))? {
            Some(d) if d.expires_at <= now => {
                let _ = fs::remove_file(self.decision_path(pattern_name));
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn clear(&self, pattern_name: &str) {
        let _ = fs::remove_file(self.pending_path(pattern_name));
        let _ = fs::remove_file(self.decision_path(pattern_name));
    }

    /// Turn a decision into an outcome. Approvals are consumed; rejections
    /// stay on disk until they expire so the pattern is not re-queued.
    fn resolve(
        &self,
        decision: ApprovalDecision,
        assertion: ConfidenceAssertion,
        policy: &GatePolicy,
    ) -> ApprovalOutcome {
        match decision.verdict {
            Verdict::Approved => {
                self.clear(&decision.pattern_name);
                ApprovalOutcome::Approved(ApprovedAssertion::from_manual(assertion, policy, &decision.approver))
            }
            Verdict::Rejected => {
                let _ = fs::remove_file(self.pending_path(&decision.pattern_name));
                ApprovalOutcome::Rejected {
                    approver: decision.approver,
                }
            }
        }
    }
}

impl ApprovalGate for FileApprovalQueue {
    fn request(&self, assertion: ConfidenceAssertion, policy: &GatePolicy) -> EngineResult<ApprovalOutcome> {
        let pattern_name = assertion.pattern_name.clone();
        let now = Utc::now();

        if let Some(decision) = self.live_decision(&pattern_name, now)? {
            return Ok(self.resolve(decision, assertion, policy));
        }

        // Keep the original request window across runs
        let expires_at = match self.live_request(&pattern_name, now)? {
            Some(existing) => {
                let refreshed = ApprovalRequest {
                    assertion: assertion.clone(),
                    ..existing
                };
                atomic_write_json(&self.pending_path(&pattern_name), &refreshed)?;
                refreshed.expires_at
            }
            None => {
                let request = ApprovalRequest {
                    pattern_name: pattern_name.clone(),
                    assertion: assertion.clone(),
                    requested_at: now,
                    expires_at: now + self.ttl,
                };
                atomic_write_json(&self.pending_path(&pattern_name), &request)?;
                log::info!(
                    "Pattern '{}' scored {}; waiting for manual approval until {}",
                    pattern_name,
                    assertion.score,
                    request.expires_at.to_rfc3339()
                );
                request.expires_at
            }
        };

        if self.timeout.is_zero() {
            return Ok(ApprovalOutcome::Pending { expires_at });
        }

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            std::thread::sleep(self.poll_interval.min(deadline.saturating_duration_since(Instant::now())));
            if let Some(decision) = self.live_decision(&pattern_name, Utc::now())? {
                return Ok(self.resolve(decision, assertion, policy));
            }
        }

        log::warn!(
            "No decision for '{}' within {:?}; assertion discarded",
            pattern_name,
            self.timeout
        );
        self.clear(&pattern_name);
        Ok(ApprovalOutcome::TimedOut)
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> EngineResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Ignoring unreadable approval file {:?}: {}", path, e);
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn assertion(name: &str, score: u8) -> ConfidenceAssertion {
        ConfidenceAssertion {
            pattern_name: name.to_string(),
            score,
            contributing_factors: BTreeMap::from([("occurrences".to_string(), score as i32)]),
            warnings: vec![],
        }
    }

    fn queue(root: &Path, timeout_ms: u64) -> FileApprovalQueue {
        FileApprovalQueue::new(
            root,
            Duration::from_millis(timeout_ms),
            Duration::from_millis(10),
            chrono::Duration::hours(1),
        )
    }

    #[test]
    fn test_request_without_wait_stays_pending() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), 0);

        let outcome = q.request(assertion("p", 70), &GatePolicy::default()).unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Pending { .. }));
        assert_eq!(q.pending().unwrap().len(), 1);
        assert!(dir.path().join("pending/p.json").exists());
    }

    #[test]
    fn test_approved_decision_lifts_assertion() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), 0);
        let policy = GatePolicy::default();

        q.request(assertion("p", 65), &policy).unwrap();
        q.decide("p", Verdict::Approved, "alice").unwrap();

        match q.request(assertion("p", 65), &policy).unwrap() {
            ApprovalOutcome::Approved(approved) => {
                assert_eq!(approved.score(), policy.approval_threshold);
                assert_eq!(approved.assertion().contributing_factors.get("manual_approval"), Some(&15));
            }
            other => panic!("expected approval, got {:?}", other),
        }
        // Consumed
        assert!(q.pending().unwrap().is_empty());
    }

    #[test]
    fn test_rejection_sticks() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), 0);
        let policy = GatePolicy::default();

        q.request(assertion("p", 70), &policy).unwrap();
        q.decide("p", Verdict::Rejected, "bob").unwrap();

        assert!(matches!(q.request(assertion("p", 70), &policy).unwrap(), ApprovalOutcome::Rejected { .. }));
        assert!(matches!(q.request(assertion("p", 75), &policy).unwrap(), ApprovalOutcome::Rejected { .. }));
        assert!(q.pending().unwrap().is_empty());
    }

    #[test]
    fn test_decide_without_request_fails() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), 0);
        let err = q.decide("ghost", Verdict::Approved, "alice").unwrap_err();
        assert!(matches!(err, EngineError::NoPendingApproval(_)));
    }

    #[test]
    fn test_timeout_discards() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), 50);

        let outcome = q.request(assertion("p", 70), &GatePolicy::default()).unwrap();
        assert!(matches!(outcome, ApprovalOutcome::TimedOut));
        assert!(!dir.path().join("pending/p.json").exists());
    }

    #[test]
    fn test_expired_request_is_dropped() {
        let dir = tempdir().unwrap();
        let q = FileApprovalQueue::new(dir.path(), Duration::ZERO, Duration::from_millis(10), chrono::Duration::zero());

        q.request(assertion("p", 70), &GatePolicy::default()).unwrap();
        assert!(q.pending().unwrap().is_empty());
        assert!(q.decide("p", Verdict::Approved, "alice").is_err());
    }

    #[test]
    fn test_waiting_request_sees_decision() {
        let dir = tempdir().unwrap();
        let q = Arc::new(queue(dir.path(), 5_000));

        let approver = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                for _ in 0..400 {
                    if q.decide("p", Verdict::Approved, "carol").is_ok() {
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let outcome = q.request(assertion("p", 60), &GatePolicy::default()).unwrap();
        approver.join().unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Approved(_)));
    }
}
