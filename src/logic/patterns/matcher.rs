//! Pattern Matcher
//!
//! Applies every registry rule to an extracted window. Rules only read the
//! window, so they are spread over a scoped worker pool and merged back in
//! registry order before ranking. Purely functional: no state, no I/O.

use std::cmp::Ordering;

use super::registry::{CompiledRule, PatternRegistry};
use super::types::{EvidenceSet, MatchOutcome, Occurrence, SubThreshold};
use crate::logic::event_log::EventRecord;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Characters of context kept on each side of a match
const EXCERPT_CONTEXT_CHARS: usize = 60;

/// Longest matched span kept verbatim in an excerpt
const EXCERPT_MATCH_CHARS: usize = 120;

/// Occurrences retained per fired rule; `count` stays exact beyond this
pub const MAX_OCCURRENCES_PER_RULE: usize = 500;

// ============================================================================
// SINGLE RULE
// ============================================================================

/// Result of scanning one rule over the window
#[derive(Debug, Clone, Default)]
pub struct RuleScan {
    pub count: usize,
    pub occurrences: Vec<Occurrence>,
}

/// One pass over the window. An event counts once even if the matcher hits
/// its payload several times; the excerpt is taken around the first hit.
pub fn scan_rule(rule: &CompiledRule, events: &[EventRecord]) -> RuleScan {
    let mut scan = RuleScan::default();

    for event in events {
        if let Some(m) = rule.regex.find(&event.payload) {
            scan.count += 1;
            if scan.occurrences.len() < MAX_OCCURRENCES_PER_RULE {
                scan.occurrences.push(Occurrence {
                    event_id: event.id.clone(),
                    timestamp: event.timestamp,
                    excerpt: excerpt(&event.payload, m.start(), m.end()),
                });
            }
        }
    }

    scan
}

// ============================================================================
// WHOLE REGISTRY
// ============================================================================

/// Evaluate every rule against the window. Sub-threshold matches are
/// reduced to a count and their occurrences dropped.
pub fn match_window(events: &[EventRecord], registry: &PatternRegistry, max_workers: usize) -> MatchOutcome {
    let rules = registry.rules();
    let scans = scan_parallel(rules, events, max_workers);

    let mut outcome = MatchOutcome {
        events_scanned: events.len(),
        ..Default::default()
    };

    for (compiled, scan) in rules.iter().zip(scans) {
        let rule = &compiled.rule;
        if scan.count == 0 {
            continue;
        }

        if scan.count >= rule.threshold as usize {
            outcome.fired.push(EvidenceSet {
                pattern_name: rule.name.clone(),
                severity: rule.severity,
                threshold: rule.threshold,
                occurrences: scan.occurrences,
                count: scan.count,
            });
        } else {
            outcome.below_threshold.push(SubThreshold {
                pattern_name: rule.name.clone(),
                count: scan.count,
                threshold: rule.threshold,
            });
        }
    }

    rank(&mut outcome.fired);

    log::info!(
        "Matched {} rule(s) over {} event(s): {} fired, {} below threshold",
        rules.len(),
        events.len(),
        outcome.fired.len(),
        outcome.below_threshold.len()
    );

    outcome
}

/// Deterministic presentation order: severity desc, count desc, name asc
pub fn rank(sets: &mut [EvidenceSet]) {
    sets.sort_by(compare_evidence);
}

fn compare_evidence(a: &EvidenceSet, b: &EvidenceSet) -> Ordering {
    b.severity
        .rank()
        .cmp(&a.severity.rank())
        .then_with(|| b.count.cmp(&a.count))
        .then_with(|| a.pattern_name.cmp(&b.pattern_name))
}

fn worker_count(max_workers: usize, jobs: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cap = if max_workers == 0 { cores } else { max_workers.min(cores) };
    cap.min(jobs).max(1)
}

/// Scans in registry order
fn scan_parallel(rules: &[CompiledRule], events: &[EventRecord], max_workers: usize) -> Vec<RuleScan> {
    let workers = worker_count(max_workers, rules.len());
    if workers <= 1 {
        return rules.iter().map(|r| scan_rule(r, events)).collect();
    }

    let chunk_size = (rules.len() + workers - 1) / workers;

    std::thread::scope(|scope| {
        let handles: Vec<_> = rules
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || chunk.iter().map(|r| scan_rule(r, events)).collect::<Vec<_>>())
            })
            .collect();

        handles
            .into_iter()
            .zip(rules.chunks(chunk_size))
            .flat_map(|(handle, chunk)| match handle.join() {
                Ok(scans) => scans,
                Err(_) => {
                    // Keep positions aligned with the registry
                    log::error!("Matcher worker panicked; {} rule(s) reported as no match", chunk.len());
                    vec![RuleScan::default(); chunk.len()]
                }
            })
            .collect()
    })
}

// ============================================================================
// EXCERPTS
// ============================================================================

/// Bounded, single-line excerpt around `payload[start..end]`. Offsets come
/// from the regex engine so they sit on char boundaries.
pub fn excerpt(payload: &str, start: usize, end: usize) -> String {
    let lead_bytes: usize = payload[..start]
        .chars()
        .rev()
        .take(EXCERPT_CONTEXT_CHARS)
        .map(char::len_utf8)
        .sum();
    let from = start - lead_bytes;

    let matched: String = payload[start..end].chars().take(EXCERPT_MATCH_CHARS).collect();
    let match_truncated = payload[start..end].chars().count() > EXCERPT_MATCH_CHARS;

    let trail: String = payload[end..].chars().take(EXCERPT_CONTEXT_CHARS).collect();
    let trail_truncated = payload[end..].chars().count() > EXCERPT_CONTEXT_CHARS;

    let mut text = String::new();
    if from > 0 {
        text.push('…');
    }
    text.push_str(&payload[from..start]);
    text.push_str(&matched);
    if match_truncated {
        text.push('…');
    } else {
        text.push_str(&trail);
        if trail_truncated {
            text.push('…');
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
