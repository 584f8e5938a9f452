//! Built-in violation rules
//!
//! The auditor's rule set is fixed. New behaviours reach detection through
//! the candidate loop instead of edits here.

use regex::Regex;

use super::types::{ViolationClass, ViolationKind, ViolationRule};
use crate::error::{EngineError, EngineResult};
use crate::logic::event_log::Actor;

// ============================================================================
// BUILT-IN RULES
// ============================================================================

pub fn builtin_rules() -> Vec<ViolationRule> {
    vec![
        // Rule 1: reading a file that was already read in this session
        ViolationRule {
            id: "repeated-file-read".to_string(),
            class: ViolationClass::Major,
            kind: ViolationKind::Repeat,
            matcher: r"(?i)\bread(?:ing)?\s+(?:file\s+)?(\S+\.\w+)".to_string(),
            actor: Some(Actor::System),
            description: "File read again without having changed".to_string(),
        },
        // Rule 2: the exact same command run twice
        ViolationRule {
            id: "redundant-command".to_string(),
            class: ViolationClass::Major,
            kind: ViolationKind::Repeat,
            matcher: r"(?im)^\s*(?:\$|bash:|run:|exec:)\s*(.+?)\s*$".to_string(),
            actor: Some(Actor::System),
            description: "Identical command re-run".to_string(),
        },
        // Rule 3: asking for permission that was already given
        ViolationRule {
            id: "unnecessary-confirmation".to_string(),
            class: ViolationClass::Minor,
            kind: ViolationKind::Literal,
            matcher: r"(?i)\b(?:shall|should) i (?:proceed|continue)\b|\bdo you want me to (?:proceed|continue)\b"
                .to_string(),
            actor: Some(Actor::System),
            description: "Confirmation requested for an already requested step".to_string(),
        },
        // Rule 4: filler before the answer
        ViolationRule {
            id: "verbose-preamble".to_string(),
            class: ViolationClass::Minor,
            kind: ViolationKind::Literal,
            matcher: r"(?i)^\s*(?:great question|certainly|absolutely|i'd be happy to|sure thing)\b".to_string(),
            actor: Some(Actor::System),
            description: "Filler preamble before the actual response".to_string(),
        },
        // Rule 5: whole-file rewrite where an edit would do
        ViolationRule {
            id: "full-file-rewrite".to_string(),
            class: ViolationClass::Major,
            kind: ViolationKind::Literal,
            matcher: r"(?i)\brewrit(?:e|ing) (?:the )?(?:entire|whole|full) file\b".to_string(),
            actor: Some(Actor::System),
            description: "Entire file rewritten for a local change".to_string(),
        },
    ]
}

// ============================================================================
// COMPILED
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledViolationRule {
    pub rule: ViolationRule,
    pub regex: Regex,
}

pub fn compile(rules: Vec<ViolationRule>) -> EngineResult<Vec<CompiledViolationRule>> {
    rules
        .into_iter()
        .map(|rule| {
            let regex = Regex::new(&rule.matcher)
                .map_err(|e| EngineError::config(format!("violation rule '{}'", rule.id), e.to_string()))?;
            if rule.kind == ViolationKind::Repeat && regex.captures_len() < 2 {
                return Err(EngineError::config(
                    format!("violation rule '{}'", rule.id),
                    "repeat rules need a capture group for the repeated key",
                ));
            }
            Ok(CompiledViolationRule { rule, regex })
        })
        .collect()
}
