//! Audit Module - Efficiency Auditor and its feedback loop
//!
//! ## Structure
//! - `types`: ViolationRule, AuditReport, Grade, CandidateRule
//! - `rules`: the fixed violation rule set
//! - `auditor`: scoring a window
//! - `history`: JSON Lines record of past runs
//! - `candidates`: recurring violations proposed as registry rules

pub mod types;
pub mod rules;
pub mod auditor;
pub mod history;
pub mod candidates;

#[cfg(test)]
mod tests;

pub use types::{
    AuditReport, AuditRunRecord, CandidateRule, CandidateStatus, Grade, Violation, ViolationClass, ViolationKind,
    ViolationRule,
};
pub use rules::builtin_rules;
pub use auditor::EfficiencyAuditor;
pub use history::{independent_sessions, AuditHistory};
pub use candidates::{candidate_name, CandidateStore};
