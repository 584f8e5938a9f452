//! Run reports

use serde::Serialize;

use crate::error::EngineError;
use crate::logic::audit::AuditReport;
use crate::logic::confidence::{ConfidenceAssertion, GateDecision};
use crate::logic::event_log::LogQuality;
use crate::logic::patterns::{EvidenceSet, SubThreshold};

// ============================================================================
// REPORTS
// ============================================================================

/// One fired rule after scoring
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub evidence: EvidenceSet,
    pub assertion: ConfidenceAssertion,
    pub decision: GateDecision,
    /// Artifact already registered for this pattern
    pub remediated_by: Option<String>,
}

impl Detection {
    pub fn pattern_name(&self) -> &str {
        &self.evidence.pattern_name
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectReport {
    pub engine_version: String,
    pub registry_version: u32,
    pub window_start: i64,
    pub window_end: i64,
    pub events_scanned: usize,
    /// Set when the log could not be read; the report is then empty
    pub log_unavailable: Option<String>,
    pub quality: LogQuality,
    /// Ranked by (severity desc, count desc, name asc)
    pub detections: Vec<Detection>,
    pub below_threshold: Vec<SubThreshold>,
}

impl DetectReport {
    pub fn get(&self, pattern_name: &str) -> Option<&Detection> {
        self.detections.iter().find(|d| d.pattern_name() == pattern_name)
    }
}

/// A pattern that could not be taken through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PatternFailure {
    pub pattern_name: String,
    pub message: String,
    pub hard: bool,
}

impl PatternFailure {
    pub(crate) fn from_error(pattern_name: &str, err: &EngineError) -> Self {
        Self {
            pattern_name: pattern_name.to_string(),
            message: err.to_string(),
            hard: err.is_hard_failure(),
        }
    }
}

/// Result of `cycle`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub detect: DetectReport,
    pub generated: Vec<String>,
    /// Waiting for a human, rejected or timed out; not failures
    pub held: Vec<String>,
    pub failures: Vec<PatternFailure>,
    pub audit: Option<AuditReport>,
    pub new_candidates: Vec<String>,
}

impl RunSummary {
    pub fn has_hard_failure(&self) -> bool {
        self.failures.iter().any(|f| f.hard)
    }
}

