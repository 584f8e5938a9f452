use super::matcher::{excerpt, match_window, rank};
use super::registry::{append_rule_to_file, default_document, write_document, PatternRegistry, RegistryDocument};
use super::types::{EvidenceSet, PatternRule, Severity};
use crate::logic::event_log::{Actor, EventRecord};
use tempfile::tempdir;

fn events(payloads: &[&str]) -> Vec<EventRecord> {
    payloads
        .iter()
        .enumerate()
        .map(|(i, p)| EventRecord::new(format!("e{}", i), 1_000 + i as i64, Actor::System, *p))
        .collect()
}

fn registry(rules: Vec<PatternRule>) -> PatternRegistry {
    PatternRegistry::from_document(RegistryDocument { version: 1, patterns: rules }).unwrap()
}

#[test]
fn test_rule_fires_at_threshold() {
    let reg = registry(vec![PatternRule::new("reads", r"read \S+", 3, Severity::Major, "batch-reads")]);
    let window = events(&["read a.rs", "read b.rs", "write c.rs", "read a.rs"]);

    let outcome = match_window(&window, &reg, 0);
    let set = outcome.get("reads").unwrap();
    assert_eq!(set.count, 3);
    assert_eq!(set.event_ids(), vec!["e0", "e1", "e3"]);
}

#[test]
fn test_sub_threshold_discarded() {
    let reg = registry(vec![PatternRule::new("reads", r"read \S+", 5, Severity::Major, "batch-reads")]);
    let window = events(&["read a.rs", "read b.rs"]);

    let outcome = match_window(&window, &reg, 0);
    assert!(outcome.fired.is_empty());
    assert_eq!(outcome.below_threshold.len(), 1);
    assert_eq!(outcome.below_threshold[0].count, 2);
}

#[test]
fn test_ranking_severity_count_name() {
    let set = |name: &str, severity, count| EvidenceSet {
        pattern_name: name.to_string(),
        severity,
        threshold: 1,
        occurrences: vec![],
        count,
    };

    let mut sets = vec![
        set("b-minor", Severity::Minor, 50),
        set("z-major", Severity::Major, 4),
        set("a-major", Severity::Major, 4),
        set("crit", Severity::Critical, 2),
        set("big-major", Severity::Major, 9),
    ];
    rank(&mut sets);

    let names: Vec<_> = sets.iter().map(|s| s.pattern_name.as_str()).collect();
    assert_eq!(names, vec!["crit", "big-major", "a-major", "z-major", "b-minor"]);
}

#[test]
fn test_parallel_matches_sequential() {
    let rules: Vec<_> = (0..12)
        .map(|i| PatternRule::new(&format!("rule-{}", i), &format!("token{}", i % 4), 1, Severity::Minor, "fix"))
        .collect();
    let reg = registry(rules);
    let window = events(&["token0 token1", "token2", "token3 token0", "nothing"]);

    let sequential = match_window(&window, &reg, 1);
    let parallel = match_window(&window, &reg, 8);
    assert_eq!(sequential.fired, parallel.fired);
    assert_eq!(parallel.fired.len(), 12);
}

#[test]
fn test_excerpt_bounded_and_single_line() {
    let payload = format!("{}\nread src/lib.rs\n{}", "x".repeat(300), "y".repeat(300));
    let start = payload.find("read").unwrap();
    let end = start + "read src/lib.rs".len();

    let text = excerpt(&payload, start, end);
    assert!(text.contains("read src/lib.rs"));
    assert!(!text.contains('\n'));
    assert!(text.chars().count() < 200);
    assert!(text.starts_with('…'));
}

#[test]
fn test_excerpt_multibyte_safe() {
    let payload = "đọc tệp ".repeat(20) + "read main.rs";
    let start = payload.find("read").unwrap();
    let text = excerpt(&payload, start, payload.len());
    assert!(text.ends_with("read main.rs"));
}

#[test]
fn test_default_registry_is_valid() {
    let reg = PatternRegistry::from_document(default_document()).unwrap();
    assert!(reg.contains("repeated-file-reads"));
    assert_eq!(reg.get("repeated-test-failures").unwrap().rule.severity, Severity::Critical);
}

#[test]
fn test_invalid_registries_rejected() {
    let bad_regex = PatternRegistry::from_yaml(
        "t",
        "version: 1\npatterns:\n  - {name: x, matcher: '(', threshold: 1, severity: minor, remediation_id: y}\n",
    );
    assert!(bad_regex.unwrap_err().is_fatal());

    let zero_threshold = PatternRegistry::from_yaml(
        "t",
        "version: 1\npatterns:\n  - {name: x, matcher: a, threshold: 0, severity: minor, remediation_id: y}\n",
    );
    assert!(zero_threshold.is_err());

    let duplicate = PatternRegistry::from_yaml(
        "t",
        "version: 1\npatterns:\n  - {name: x, matcher: a, threshold: 1, severity: minor, remediation_id: y}\n  - {name: x, matcher: b, threshold: 1, severity: major, remediation_id: z}\n",
    );
    assert!(duplicate.is_err());

    let bad_severity = PatternRegistry::from_yaml(
        "t",
        "version: 1\npatterns:\n  - {name: x, matcher: a, threshold: 1, severity: huge, remediation_id: y}\n",
    );
    assert!(bad_severity.is_err());
}

#[test]
fn test_yaml_defaults_applied() {
    let reg = PatternRegistry::from_yaml(
        "t",
        "version: 7\npatterns:\n  - name: x\n    matcher: a\n    threshold: 2\n    severity: critical\n    remediation_id: fix-x\n",
    )
    .unwrap();
    assert_eq!(reg.version(), 7);
    assert_eq!(reg.get("x").unwrap().rule.kind, "skill");
    assert_eq!(reg.digest().len(), 64);
}

#[test]
fn test_append_rule_bumps_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("patterns.yaml");
    write_document(&path, &default_document()).unwrap();

    let version = append_rule_to_file(
        &path,
        PatternRule::new("audit-new", "something", 2, Severity::Minor, "fix-new"),
    )
    .unwrap();
    assert_eq!(version, 2);

    let reg = PatternRegistry::load(&path).unwrap();
    assert_eq!(reg.version(), 2);
    assert!(reg.contains("audit-new"));

    // Same name twice is refused
    assert!(append_rule_to_file(
        &path,
        PatternRule::new("audit-new", "other", 2, Severity::Minor, "fix-new"),
    )
    .is_err());
}
