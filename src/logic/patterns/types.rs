//! Pattern Types
//!
//! Rule definitions and the evidence they produce.
//! Data structures only - matching lives in `matcher`.

use serde::{Deserialize, Serialize};

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor = 1,
    Major = 2,
    Critical = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }

    /// critical > major > minor
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// PATTERN RULE
// ============================================================================

fn default_kind() -> String {
    "skill".to_string()
}

/// One named detection rule from the Pattern Registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub name: String,
    /// Regex applied to each event payload
    pub matcher: String,
    /// Matches needed before the rule fires (>= 1)
    pub threshold: u32,
    pub severity: Severity,
    pub remediation_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Template kind used when remediating
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Efficiency Auditor violation ids that corroborate this rule
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corroborated_by: Vec<String>,
}

impl PatternRule {
    pub fn new(
        name: &str,
        matcher: &str,
        threshold: u32,
        severity: Severity,
        remediation_id: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            matcher: matcher.to_string(),
            threshold,
            severity,
            remediation_id: remediation_id.to_string(),
            description: String::new(),
            kind: default_kind(),
            corroborated_by: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn corroborated_by(mut self, violation_id: &str) -> Self {
        self.corroborated_by.push(violation_id.to_string());
        self
    }
}

// ============================================================================
// EVIDENCE
// ============================================================================

/// One matching event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub event_id: String,
    pub timestamp: i64,
    pub excerpt: String,
}

/// Occurrences of one fired rule inside one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
    pub pattern_name: String,
    pub severity: Severity,
    pub threshold: u32,
    /// Chronological; capped, see `count` for the exact total
    pub occurrences: Vec<Occurrence>,
    pub count: usize,
}

impl EvidenceSet {
    pub fn event_ids(&self) -> Vec<String> {
        self.occurrences.iter().map(|o| o.event_id.clone()).collect()
    }
}

/// A rule that matched but stayed under its threshold. Occurrences are
/// dropped, only the count survives for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubThreshold {
    pub pattern_name: String,
    pub count: usize,
    pub threshold: u32,
}

/// Matcher output for one window
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchOutcome {
    /// Ranked by (severity desc, count desc, name asc)
    pub fired: Vec<EvidenceSet>,
    pub below_threshold: Vec<SubThreshold>,
    pub events_scanned: usize,
}

impl MatchOutcome {
    pub fn get(&self, pattern_name: &str) -> Option<&EvidenceSet> {
        self.fired.iter().find(|e| e.pattern_name == pattern_name)
    }
}
