//! Independent evidence streams
//!
//! A stream looks at a source other than the primary event log and reports
//! how strongly it agrees with a rule. Streams never see each other.

use std::collections::BTreeMap;

use super::scorer::STREAM_CAP;
use super::types::Corroboration;
use crate::logic::event_log::EventRecord;
use crate::logic::patterns::{scan_rule, CompiledRule};

pub trait EvidenceStream {
    fn name(&self) -> &str;

    /// `None` when the stream has nothing to say about this rule
    fn corroborate(&self, rule: &CompiledRule) -> Option<Corroboration>;
}

// ============================================================================
// SECONDARY LOG
// ============================================================================

/// A second log (e.g. tool-call records) scanned with the same matcher
pub struct SecondaryLogStream {
    name: String,
    events: Vec<EventRecord>,
}

impl SecondaryLogStream {
    pub fn new(name: &str, events: Vec<EventRecord>) -> Self {
        Self {
            name: name.to_string(),
            events,
        }
    }

    fn points_for(count: usize) -> u8 {
        match count {
            0 => 0,
            1 => 10,
            2..=4 => 20,
            _ => 30,
        }
    }
}

impl EvidenceStream for SecondaryLogStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn corroborate(&self, rule: &CompiledRule) -> Option<Corroboration> {
        let scan = scan_rule(rule, &self.events);
        if scan.count == 0 {
            return None;
        }

        Some(Corroboration {
            source: self.name.clone(),
            points: Self::points_for(scan.count),
            detail: format!("{} matching record(s)", scan.count),
        })
    }
}

// ============================================================================
// AUDITOR VIOLATIONS
// ============================================================================

const POINTS_PER_SESSION: usize = 10;

/// Efficiency Auditor history: violation rule id -> number of independent
/// earlier sessions it was seen in. Built from audit runs whose windows do
/// not overlap the window being scored, so it never re-reads the primary
/// evidence.
pub struct AuditViolationStream {
    sessions: BTreeMap<String, usize>,
}

impl AuditViolationStream {
    pub const NAME: &'static str = "audit";

    pub fn new(sessions: BTreeMap<String, usize>) -> Self {
        Self { sessions }
    }
}

impl EvidenceStream for AuditViolationStream {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn corroborate(&self, rule: &CompiledRule) -> Option<Corroboration> {
        let hits: Vec<(&str, usize)> = rule
            .rule
            .corroborated_by
            .iter()
            .filter_map(|id| self.sessions.get(id).map(|n| (id.as_str(), *n)))
            .filter(|(_, n)| *n > 0)
            .collect();

        if hits.is_empty() {
            return None;
        }

        let total: usize = hits.iter().map(|(_, n)| n).sum();
        let points = total
            .saturating_mul(POINTS_PER_SESSION)
            .min(STREAM_CAP as usize) as u8;

        let detail = hits
            .iter()
            .map(|(id, n)| format!("{} in {} earlier session(s)", id, n))
            .collect::<Vec<_>>()
            .join(", ");

        Some(Corroboration {
            source: Self::NAME.to_string(),
            points,
            detail,
        })
    }
}
