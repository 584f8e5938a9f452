//! Confidence Module - scoring and the approval gate
//!
//! # Components
//! - `types.rs`: ConfidenceAssertion, GatePolicy, ApprovedAssertion
//! - `scorer.rs`: additive scoring with named factors
//! - `streams.rs`: secondary log and auditor corroboration

pub mod types;
pub mod scorer;
pub mod streams;


pub use types::{
    ApprovalKind, ApprovedAssertion, ConfidenceAssertion, Corroboration, GateDecision, GatePolicy,
    MANUAL_APPROVAL_FACTOR,
};
pub use scorer::{base_points, score, score_cross_source};
pub use streams::{AuditViolationStream, EvidenceStream, SecondaryLogStream};
