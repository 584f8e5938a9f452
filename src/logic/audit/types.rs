//! Audit Types
//!
//! Data structures only - no I/O here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::event_log::Actor;
use crate::logic::patterns::Severity;

// ============================================================================
// VIOLATION RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationClass {
    Major,
    Minor,
}

impl ViolationClass {
    pub fn points(&self) -> u32 {
        match self {
            ViolationClass::Major => 10,
            ViolationClass::Minor => 3,
        }
    }

    /// Severity a promoted candidate rule gets
    pub fn severity(&self) -> Severity {
        match self {
            ViolationClass::Major => Severity::Major,
            ViolationClass::Minor => Severity::Minor,
        }
    }
}

/// How a rule turns matches into violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// Every match is a violation
    Literal,
    /// The first sighting of a captured key is free, every repeat is a violation
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRule {
    pub id: String,
    pub class: ViolationClass,
    pub kind: ViolationKind,
    /// Repeat rules key on capture group 1
    pub matcher: String,
    /// Restrict to one actor; `None` = any
    pub actor: Option<Actor>,
    pub description: String,
}

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub class: ViolationClass,
    pub event_id: String,
    pub timestamp: i64,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Perfect,
    Good,
    NeedsImprovement,
    Critical,
}

impl Grade {
    /// 0 Perfect, 1-6 Good, 7-15 Needs Improvement, >15 Critical
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => Grade::Perfect,
            1..=6 => Grade::Good,
            7..=15 => Grade::NeedsImprovement,
            _ => Grade::Critical,
        }
    }

    /// Process exit code for `audit`
    pub fn exit_code(&self) -> i32 {
        match self {
            Grade::Perfect => 0,
            Grade::Good => 1,
            Grade::NeedsImprovement => 2,
            Grade::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Perfect => "Perfect",
            Grade::Good => "Good",
            Grade::NeedsImprovement => "Needs Improvement",
            Grade::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one audit run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: String,
    pub audited_at: DateTime<Utc>,
    pub window_start: i64,
    pub window_end: i64,
    pub events_audited: usize,
    pub violations: Vec<Violation>,
    pub score: u32,
    pub grade: Grade,
}

impl AuditReport {
    /// rule id -> number of violations
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for v in &self.violations {
            *counts.entry(v.rule_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// One line of the audit history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRunRecord {
    pub run_id: String,
    pub audited_at: DateTime<Utc>,
    /// Audited window, inclusive, epoch ms
    #[serde(default)]
    pub window_start: i64,
    #[serde(default)]
    pub window_end: i64,
    pub score: u32,
    pub grade: Grade,
    pub events_audited: usize,
    pub violation_counts: BTreeMap<String, usize>,
}

impl AuditRunRecord {
    /// Whether the audited window shares any instant with `[start, end]`
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.window_start <= end && start <= self.window_end
    }
}

impl From<&AuditReport> for AuditRunRecord {
    fn from(report: &AuditReport) -> Self {
        Self {
            run_id: report.run_id.clone(),
            audited_at: report.audited_at,
            window_start: report.window_start,
            window_end: report.window_end,
            score: report.score,
            grade: report.grade,
            events_audited: report.events_audited,
            violation_counts: report.counts(),
        }
    }
}

// ============================================================================
// CANDIDATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Pending,
    Approved,
    Rejected,
}

/// A proposed Pattern Registry entry derived from a recurring violation.
/// Data only until someone approves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRule {
    pub rule: crate::logic::patterns::PatternRule,
    pub violation_id: String,
    /// Non-overlapping audited windows the violation appeared in when proposed
    pub runs_seen: usize,
    pub proposed_at: DateTime<Utc>,
    pub status: CandidateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl CandidateRule {
    pub fn name(&self) -> &str {
        &self.rule.name
    }
}
