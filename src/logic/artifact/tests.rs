use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use super::*;
use crate::error::EngineError;
use crate::logic::confidence::{ApprovedAssertion, ConfidenceAssertion, GatePolicy};
use crate::logic::patterns::{EvidenceSet, Occurrence, PatternRegistry, PatternRule, RegistryDocument, Severity};
use crate::logic::registry_index::{LockPolicy, RegistryUpdater};

struct Fixture {
    dir: TempDir,
    registry: PatternRegistry,
}

impl Fixture {
    fn new(rules: Vec<PatternRule>) -> Self {
        let dir = tempdir().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        for (kind, source) in default_templates() {
            fs::write(templates.join(format!("{}.md", kind)), source).unwrap();
        }

        let registry = PatternRegistry::from_document(RegistryDocument { version: 4, patterns: rules }).unwrap();
        Self { dir, registry }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn generator(&self) -> ArtifactGenerator {
        ArtifactGenerator::new(
            self.root().join("skills"),
            TemplateStore::new(self.root().join("templates")),
            RegistryUpdater::new(self.root().join("skills-index.json"), LockPolicy::default()),
        )
    }

    fn index_len(&self) -> usize {
        RegistryUpdater::new(self.root().join("skills-index.json"), LockPolicy::default())
            .read()
            .unwrap()
            .len()
    }
}

fn rule(name: &str, remediation: &str) -> PatternRule {
    PatternRule::new(name, "context limit", 2, Severity::Critical, remediation)
}

fn evidence_with(name: &str, excerpt: &str, retained: usize, count: usize) -> EvidenceSet {
    let occurrences: Vec<_> = (0..retained)
        .map(|i| Occurrence {
            event_id: format!("e{}", i),
            timestamp: 1_700_000_000_000 + i as i64,
            excerpt: excerpt.to_string(),
        })
        .collect();
    EvidenceSet {
        pattern_name: name.to_string(),
        severity: Severity::Critical,
        threshold: 2,
        count,
        occurrences,
    }
}

fn evidence(name: &str) -> EvidenceSet {
    evidence_with(name, "hit the context limit again", 6, 6)
}

fn approved(name: &str, score: u8) -> ApprovedAssertion {
    let assertion = ConfidenceAssertion {
        pattern_name: name.to_string(),
        score,
        contributing_factors: BTreeMap::from([
            ("occurrences".to_string(), 40),
            ("severity".to_string(), 20),
            ("stream:audit".to_string(), 30),
        ]),
        warnings: vec![],
    };
    ApprovedAssertion::from_gate(assertion, &GatePolicy::default()).unwrap()
}

fn generate(fixture: &Fixture, generator: &ArtifactGenerator, name: &str) -> Result<Generation, EngineError> {
    generate_from(fixture, generator, name, &evidence(name))
}

fn generate_from(
    fixture: &Fixture,
    generator: &ArtifactGenerator,
    name: &str,
    evidence: &EvidenceSet,
) -> Result<Generation, EngineError> {
    let approved = approved(name, 90);
    let rule = &fixture.registry.get(name).unwrap().rule;
    generator.generate(&GenerationRequest {
        approved: &approved,
        rule,
        evidence,
        registry: &fixture.registry,
    })
}

#[test]
fn test_generates_body_and_provenance() {
    let fixture = Fixture::new(vec![rule("context-overflow", "Compact Context Early")]);
    let generator = fixture.generator();

    let generation = generate(&fixture, &generator, "context-overflow").unwrap();
    assert!(generation.is_created());

    let artifact = generation.artifact();
    assert_eq!(artifact.id, "compact-context-early");
    assert_eq!(artifact.evidence_refs.len(), 6);
    assert_eq!(artifact.occurrence_count, 6);
    assert!(!artifact.evidence_refs_truncated);
    assert_eq!(artifact.registry_version, 4);
    assert!(artifact.body.contains("Pattern `context-overflow` matched 6 time(s)"));
    assert!(!artifact.body.contains("{{"));

    let loaded = Artifact::load(generator.artifacts_dir(), &artifact.id).unwrap();
    assert_eq!(&loaded, artifact);
    assert_eq!(fixture.index_len(), 1);
}

#[test]
fn test_second_generate_returns_existing() {
    let fixture = Fixture::new(vec![rule("context-overflow", "compact-context-early")]);
    let generator = fixture.generator();

    let first = generate(&fixture, &generator, "context-overflow").unwrap();
    let body_before = fs::read(Artifact::body_path(generator.artifacts_dir(), &first.artifact().id)).unwrap();

    let second = generate(&fixture, &generator, "context-overflow").unwrap();
    assert!(!second.is_created());
    assert_eq!(second.artifact(), first.artifact());
    assert_eq!(fixture.index_len(), 1);

    let body_after = fs::read(Artifact::body_path(generator.artifacts_dir(), &first.artifact().id)).unwrap();
    assert_eq!(body_before, body_after);
}

#[test]
fn test_concurrent_same_pattern_yields_one_artifact() {
    let fixture = Arc::new(Fixture::new(vec![rule("context-overflow", "compact-context-early")]));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let fixture = Arc::clone(&fixture);
            std::thread::spawn(move || {
                let generator = fixture.generator();
                generate(&fixture, &generator, "context-overflow").unwrap().is_created()
            })
        })
        .collect();

    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|created| *created)
        .count();
    assert_eq!(created, 1);
    assert_eq!(fixture.index_len(), 1);

    let files = fs::read_dir(fixture.root().join("skills")).unwrap().count();
    assert_eq!(files, 2);
}

#[test]
fn test_colliding_remediation_ids_get_suffix() {
    let fixture = Fixture::new(vec![rule("a", "shared-fix"), rule("b", "shared-fix")]);
    let generator = fixture.generator();

    let a = generate(&fixture, &generator, "a").unwrap();
    let b = generate(&fixture, &generator, "b").unwrap();
    assert_eq!(a.artifact().id, "shared-fix");
    assert_eq!(b.artifact().id, "shared-fix-2");
    assert_eq!(fixture.index_len(), 2);
}

#[test]
fn test_missing_template_writes_nothing() {
    let mut r = rule("context-overflow", "compact-context-early");
    r.kind = "checklist".to_string();
    let fixture = Fixture::new(vec![r]);
    let generator = fixture.generator();

    let err = generate(&fixture, &generator, "context-overflow").unwrap_err();
    assert!(matches!(err, EngineError::TemplateUnavailable { ref kind, .. } if kind == "checklist"));
    assert_eq!(fixture.index_len(), 0);
    assert!(!generator.artifacts_dir().exists());
}

#[test]
fn test_unresolved_marker_writes_nothing() {
    let fixture = Fixture::new(vec![rule("context-overflow", "compact-context-early")]);
    fs::write(fixture.root().join("templates/skill.md"), "# {{PATTERN_NAME}}\nOwner: {{OWNER}}\n").unwrap();
    let generator = fixture.generator();

    let err = generate(&fixture, &generator, "context-overflow").unwrap_err();
    match err {
        EngineError::IncompleteGeneration { placeholder, .. } => assert_eq!(placeholder, "OWNER"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fixture.index_len(), 0);
    assert!(!Artifact::body_path(generator.artifacts_dir(), "compact-context-early").exists());
}

#[test]
fn test_marker_in_evidence_writes_nothing() {
    let fixture = Fixture::new(vec![rule("context-overflow", "compact-context-early")]);
    let generator = fixture.generator();
    let tainted = evidence_with("context-overflow", "hit the context limit {{OWNER}}", 6, 6);

    let err = generate_from(&fixture, &generator, "context-overflow", &tainted).unwrap_err();
    match err {
        EngineError::IncompleteGeneration { placeholder, .. } => assert_eq!(placeholder, "OWNER"),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(fixture.index_len(), 0);
    assert!(!Artifact::body_path(generator.artifacts_dir(), "compact-context-early").exists());
    assert!(!Artifact::provenance_path(generator.artifacts_dir(), "compact-context-early").exists());
}

#[test]
fn test_capped_evidence_is_flagged() {
    let fixture = Fixture::new(vec![rule("context-overflow", "compact-context-early")]);
    let generator = fixture.generator();
    let capped = evidence_with("context-overflow", "hit the context limit", 3, 1200);

    let generation = generate_from(&fixture, &generator, "context-overflow", &capped).unwrap();
    let artifact = generation.artifact();
    assert_eq!(artifact.evidence_refs.len(), 3);
    assert_eq!(artifact.occurrence_count, 1200);
    assert!(artifact.evidence_refs_truncated);

    let loaded = Artifact::load(generator.artifacts_dir(), &artifact.id).unwrap();
    assert!(loaded.evidence_refs_truncated);
    assert_eq!(loaded.occurrence_count, 1200);
}

#[test]
fn test_slugify() {
    assert_eq!(slugify("Batch File Reads"), "batch-file-reads");
    assert_eq!(slugify("--fix__it.now--"), "fix-it-now");
    assert_eq!(slugify("***"), "artifact");
}
