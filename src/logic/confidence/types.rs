//! Confidence Types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// ASSERTION
// ============================================================================

/// Certainty (0-100) that a detected pattern warrants remediation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceAssertion {
    pub pattern_name: String,
    pub score: u8,
    /// factor name -> signed points
    pub contributing_factors: BTreeMap<String, i32>,
    /// Observations that did not change the score
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Points from one independent evidence stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corroboration {
    pub source: String,
    pub points: u8,
    pub detail: String,
}

// ============================================================================
// GATE
// ============================================================================

/// Where an assertion goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// score >= approval threshold
    Generate,
    /// manual review floor <= score < approval threshold
    ManualReview,
    /// below the manual review floor
    Discard,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Generate => "generate",
            GateDecision::ManualReview => "manual-review",
            GateDecision::Discard => "discard",
        }
    }
}

/// Gate thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub approval_threshold: u8,
    pub manual_review_floor: u8,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            approval_threshold: crate::constants::DEFAULT_APPROVAL_THRESHOLD,
            manual_review_floor: crate::constants::DEFAULT_MANUAL_REVIEW_FLOOR,
        }
    }
}

impl GatePolicy {
    pub fn decide(&self, score: u8) -> GateDecision {
        if score >= self.approval_threshold {
            GateDecision::Generate
        } else if score >= self.manual_review_floor {
            GateDecision::ManualReview
        } else {
            GateDecision::Discard
        }
    }
}

// ============================================================================
// APPROVED ASSERTION
// ============================================================================

/// How an assertion cleared the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalKind {
    Automatic,
    Manual { approver: String },
}

/// An assertion that cleared the gate. The only input the Artifact
/// Generator accepts; its score is always >= the approval threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedAssertion {
    assertion: ConfidenceAssertion,
    approval: ApprovalKind,
}

/// Factor recorded when a human lifts an assertion over the gate
pub const MANUAL_APPROVAL_FACTOR: &str = "manual_approval";

impl ApprovedAssertion {
    /// Automatic approval; hands the assertion back when it is below the gate
    pub fn from_gate(assertion: ConfidenceAssertion, policy: &GatePolicy) -> Result<Self, ConfidenceAssertion> {
        if policy.decide(assertion.score) == GateDecision::Generate {
            Ok(Self {
                assertion,
                approval: ApprovalKind::Automatic,
            })
        } else {
            Err(assertion)
        }
    }

    /// A human approved an assertion from the manual review band. The
    /// difference to the gate is recorded as its own factor.
    pub fn from_manual(mut assertion: ConfidenceAssertion, policy: &GatePolicy, approver: &str) -> Self {
        if assertion.score < policy.approval_threshold {
            let lift = (policy.approval_threshold - assertion.score) as i32;
            assertion
                .contributing_factors
                .insert(MANUAL_APPROVAL_FACTOR.to_string(), lift);
            assertion.score = policy.approval_threshold;
        }

        Self {
            assertion,
            approval: ApprovalKind::Manual {
                approver: approver.to_string(),
            },
        }
    }

    pub fn assertion(&self) -> &ConfidenceAssertion {
        &self.assertion
    }

    pub fn approval(&self) -> &ApprovalKind {
        &self.approval
    }

    pub fn pattern_name(&self) -> &str {
        &self.assertion.pattern_name
    }

    pub fn score(&self) -> u8 {
        self.assertion.score
    }
}
