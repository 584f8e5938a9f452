//! Efficiency Auditor
//!
//! Scores a window against the fixed violation rules:
//! `score = majors x 10 + minors x 3`.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use super::rules::{builtin_rules, compile, CompiledViolationRule};
use super::types::{AuditReport, Grade, Violation, ViolationKind};
use crate::error::EngineResult;
use crate::logic::event_log::EventRecord;

const DETAIL_MAX_CHARS: usize = 120;

pub struct EfficiencyAuditor {
    rules: Vec<CompiledViolationRule>,
}

impl EfficiencyAuditor {
    pub fn new() -> EngineResult<Self> {
        Ok(Self {
            rules: compile(builtin_rules())?,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &CompiledViolationRule> {
        self.rules.iter()
    }

    /// Audit a chronological window
    pub fn audit(&self, events: &[EventRecord], window_start: i64, window_end: i64) -> AuditReport {
        let mut violations = Vec::new();

        for compiled in &self.rules {
            match compiled.rule.kind {
                ViolationKind::Literal => literal_violations(compiled, events, &mut violations),
                ViolationKind::Repeat => repeat_violations(compiled, events, &mut violations),
            }
        }

        violations.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.rule_id.cmp(&b.rule_id)));

        let score: u32 = violations.iter().map(|v| v.class.points()).sum();
        let grade = Grade::from_score(score);

        log::info!(
            "Audited {} event(s): {} violation(s), score {} ({})",
            events.len(),
            violations.len(),
            score,
            grade
        );

        AuditReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            audited_at: Utc::now(),
            window_start,
            window_end,
            events_audited: events.len(),
            violations,
            score,
            grade,
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn applies(compiled: &CompiledViolationRule, event: &EventRecord) -> bool {
    compiled.rule.actor.map_or(true, |actor| actor == event.actor)
}

fn violation(compiled: &CompiledViolationRule, event: &EventRecord, detail: &str) -> Violation {
    Violation {
        rule_id: compiled.rule.id.clone(),
        class: compiled.rule.class,
        event_id: event.id.clone(),
        timestamp: event.timestamp,
        detail: detail.chars().take(DETAIL_MAX_CHARS).collect(),
    }
}

fn literal_violations(compiled: &CompiledViolationRule, events: &[EventRecord], out: &mut Vec<Violation>) {
    for event in events.iter().filter(|e| applies(compiled, e)) {
        for m in compiled.regex.find_iter(&event.payload) {
            out.push(violation(compiled, event, m.as_str()));
        }
    }
}

fn repeat_violations(compiled: &CompiledViolationRule, events: &[EventRecord], out: &mut Vec<Violation>) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut repeats: HashMap<String, usize> = HashMap::new();

    for event in events.iter().filter(|e| applies(compiled, e)) {
        for caps in compiled.regex.captures_iter(&event.payload) {
            let Some(key) = caps.get(1) else { continue };
            let key = key.as_str().trim().to_string();
            if key.is_empty() {
                continue;
            }
            if !seen.insert(key.clone()) {
                let n = repeats.entry(key.clone()).or_insert(1);
                *n += 1;
                out.push(violation(compiled, event, &format!("{} (seen {} times)", key, n)));
            }
        }
    }
}
