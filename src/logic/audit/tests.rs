use tempfile::tempdir;

use super::*;
use crate::error::EngineError;
use crate::logic::event_log::{Actor, EventRecord};
use crate::logic::patterns::{default_document, write_document, PatternRegistry};
use crate::logic::registry_index::LockPolicy;

fn system(id: &str, ts: i64, payload: &str) -> EventRecord {
    EventRecord::new(id, ts, Actor::System, payload)
}

#[test]
fn test_grade_bands() {
    assert_eq!(Grade::from_score(0), Grade::Perfect);
    assert_eq!(Grade::from_score(6), Grade::Good);
    assert_eq!(Grade::from_score(7), Grade::NeedsImprovement);
    assert_eq!(Grade::from_score(15), Grade::NeedsImprovement);
    assert_eq!(Grade::from_score(16), Grade::Critical);
    assert_eq!(Grade::Critical.exit_code(), 3);
}

#[test]
fn test_clean_window_is_perfect() {
    let auditor = EfficiencyAuditor::new().unwrap();
    let events = vec![system("e1", 1, "read src/lib.rs"), system("e2", 2, "done")];

    let report = auditor.audit(&events, 0, 10);
    assert_eq!(report.score, 0);
    assert_eq!(report.grade, Grade::Perfect);
}

#[test]
fn test_repeat_rule_counts_repeats_only() {
    let auditor = EfficiencyAuditor::new().unwrap();
    let events = vec![
        system("e1", 1, "read src/lib.rs"),
        system("e2", 2, "read src/main.rs"),
        system("e3", 3, "read src/lib.rs"),
        system("e4", 4, "reading src/lib.rs"),
    ];

    let report = auditor.audit(&events, 0, 10);
    let counts = report.counts();
    assert_eq!(counts.get("repeated-file-read"), Some(&2));
    assert_eq!(report.score, 20);
    assert_eq!(report.grade, Grade::Critical);
}

#[test]
fn test_literal_rule_counts_every_match() {
    let auditor = EfficiencyAuditor::new().unwrap();
    let events = vec![
        system("e1", 1, "Shall I proceed? Should I continue?"),
        EventRecord::new("e2", 2, Actor::User, "shall I proceed"),
    ];

    let report = auditor.audit(&events, 0, 10);
    // User events are not held against the assistant
    assert_eq!(report.counts().get("unnecessary-confirmation"), Some(&2));
    assert_eq!(report.score, 6);
    assert_eq!(report.grade, Grade::Good);
}

#[test]
fn test_redundant_command() {
    let auditor = EfficiencyAuditor::new().unwrap();
    let events = vec![
        system("e1", 1, "$ cargo test"),
        system("e2", 2, "$ cargo build"),
        system("e3", 3, "bash: cargo test"),
    ];

    let report = auditor.audit(&events, 0, 10);
    assert_eq!(report.counts().get("redundant-command"), Some(&1));
    assert_eq!(report.violations[0].event_id, "e3");
}

#[test]
fn test_history_roundtrip_skips_garbage() {
    let dir = tempdir().unwrap();
    let history = AuditHistory::new(dir.path().join("audit-history.jsonl"));
    assert!(history.load().unwrap().is_empty());

    let auditor = EfficiencyAuditor::new().unwrap();
    let report = auditor.audit(&[system("e1", 1, "Certainly! here it is")], 0, 10);
    history.append(&report).unwrap();

    std::fs::OpenOptions::new()
        .append(true)
        .open(history.path())
        .and_then(|mut f| std::io::Write::write_all(&mut f, b"not json\n"))
        .unwrap();
    history.append(&report).unwrap();

    let records = history.load().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].violation_counts.get("verbose-preamble"), Some(&1));
}

#[test]
fn test_candidate_lifecycle() {
    let dir = tempdir().unwrap();
    let registry_path = dir.path().join("patterns.yaml");
    write_document(&registry_path, &default_document()).unwrap();
    let registry = PatternRegistry::load(&registry_path).unwrap();

    let auditor = EfficiencyAuditor::new().unwrap();
    let history = AuditHistory::new(dir.path().join("audit-history.jsonl"));
    let store = CandidateStore::new(dir.path().join("candidate-patterns.json"), LockPolicy::default());
    let rules = builtin_rules();

    // Two sessions are not enough
    for session in 0..2 {
        let at = session * 100;
        history.append(&auditor.audit(&[system("e", at + 1, "rewriting the entire file")], at, at + 10)).unwrap();
    }
    assert!(store.propose(&history.load().unwrap(), &rules, &registry).unwrap().is_empty());

    history.append(&auditor.audit(&[system("e", 201, "rewriting the entire file")], 200, 210)).unwrap();
    let added = store.propose(&history.load().unwrap(), &rules, &registry).unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].name(), "audit-full-file-rewrite");
    assert_eq!(added[0].status, CandidateStatus::Pending);

    // Not proposed twice
    assert!(store.propose(&history.load().unwrap(), &rules, &registry).unwrap().is_empty());

    let (approved, version) = store.approve("audit-full-file-rewrite", &registry_path).unwrap();
    assert_eq!(approved.status, CandidateStatus::Approved);
    assert_eq!(version, 2);

    let reloaded = PatternRegistry::load(&registry_path).unwrap();
    assert!(reloaded.contains("audit-full-file-rewrite"));

    // Decided once
    let err = store.reject("audit-full-file-rewrite").unwrap_err();
    assert!(matches!(err, EngineError::CandidateDecided { .. }));
    assert!(store.propose(&history.load().unwrap(), &rules, &reloaded).unwrap().is_empty());
}

#[test]
fn test_rejected_candidate_not_reproposed() {
    let dir = tempdir().unwrap();
    let registry = PatternRegistry::from_document(default_document()).unwrap();
    let auditor = EfficiencyAuditor::new().unwrap();
    let history = AuditHistory::new(dir.path().join("audit-history.jsonl"));
    let store = CandidateStore::new(dir.path().join("candidate-patterns.json"), LockPolicy::default());
    let rules = builtin_rules();

    for session in 0..3 {
        let at = session * 100;
        history.append(&auditor.audit(&[system("e", at + 1, "Absolutely, on it")], at, at + 10)).unwrap();
    }
    assert_eq!(store.propose(&history.load().unwrap(), &rules, &registry).unwrap().len(), 1);

    store.reject("audit-verbose-preamble").unwrap();
    history.append(&auditor.audit(&[system("e", 301, "Absolutely, on it")], 300, 310)).unwrap();
    assert!(store.propose(&history.load().unwrap(), &rules, &registry).unwrap().is_empty());

    assert!(matches!(store.approve("nope", dir.path()).unwrap_err(), EngineError::UnknownCandidate(_)));
}

#[test]
fn test_reaudit_of_same_window_is_one_session() {
    let dir = tempdir().unwrap();
    let registry = PatternRegistry::from_document(default_document()).unwrap();
    let auditor = EfficiencyAuditor::new().unwrap();
    let history = AuditHistory::new(dir.path().join("audit-history.jsonl"));
    let store = CandidateStore::new(dir.path().join("candidate-patterns.json"), LockPolicy::default());
    let events = [system("e", 5, "rewriting the entire file")];

    for _ in 0..3 {
        history.append(&auditor.audit(&events, 0, 10)).unwrap();
    }
    // Overlapping re-audit of the same event
    history.append(&auditor.audit(&events, 3, 20)).unwrap();

    let records = history.load().unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].window_start, 0);
    assert_eq!(records[0].window_end, 10);
    assert_eq!(independent_sessions(&records).get("full-file-rewrite"), Some(&1));
    assert!(store.propose(&records, &builtin_rules(), &registry).unwrap().is_empty());
}

#[test]
fn test_independent_sessions_counts_disjoint_windows() {
    let auditor = EfficiencyAuditor::new().unwrap();
    let record = |start: i64, end: i64, payload: &str| {
        AuditRunRecord::from(&auditor.audit(&[system("e", start, payload)], start, end))
    };

    let records = vec![
        record(0, 10, "Certainly! on it"),
        record(10, 20, "Certainly! on it"),
        record(21, 30, "Certainly! on it"),
        record(40, 50, "all done"),
    ];
    let sessions = independent_sessions(&records);

    // [0,10] and [10,20] share an instant
    assert_eq!(sessions.get("verbose-preamble"), Some(&2));
    assert_eq!(sessions.get("full-file-rewrite"), None);
    assert!(records[0].overlaps(10, 15));
    assert!(!records[3].overlaps(0, 39));
}

#[test]
fn test_candidate_is_not_self_corroborated() {
    let dir = tempdir().unwrap();
    let registry = PatternRegistry::from_document(default_document()).unwrap();
    let auditor = EfficiencyAuditor::new().unwrap();
    let history = AuditHistory::new(dir.path().join("audit-history.jsonl"));
    let store = CandidateStore::new(dir.path().join("candidate-patterns.json"), LockPolicy::default());

    for session in 0..3 {
        let at = session * 100;
        history.append(&auditor.audit(&[system("e", at, "rewriting the entire file")], at, at + 10)).unwrap();
    }
    let added = store.propose(&history.load().unwrap(), &builtin_rules(), &registry).unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].runs_seen, 3);
    assert!(added[0].rule.corroborated_by.is_empty());
}
