//! Patterns Module - Pattern Registry + Pattern Matcher
//!
//! # Components
//! - `types.rs`: PatternRule, Severity, EvidenceSet
//! - `registry.rs`: YAML registry loading, validation, approved-rule append
//! - `matcher.rs`: parallel window scan and ranking

pub mod types;
pub mod registry;
pub mod matcher;

#[cfg(test)]
mod tests;

pub use types::{EvidenceSet, MatchOutcome, Occurrence, PatternRule, Severity, SubThreshold};
pub use registry::{
    append_rule_to_file, default_document, write_document, CompiledRule, PatternRegistry, RegistryDocument,
};
pub use matcher::{match_window, rank, scan_rule};
