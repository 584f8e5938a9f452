//! Pattern Registry
//!
//! Versioned, human-editable YAML list of detection rules. Loaded once per
//! run into an immutable, pre-compiled snapshot; edits made while a run is
//! in flight only show up in the next run.
//!
//! ```yaml
//! version: 3
//! patterns:
//!   - name: repeated-file-reads
//!     matcher: '(?i)\bread(?:ing)?\s+\S+\.\w+'
//!     threshold: 3
//!     severity: major
//!     remediation_id: batch-file-reads
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::{PatternRule, Severity};
use crate::error::{EngineError, EngineResult};
use crate::logic::registry_index::atomic_write;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Compiled regex size cap, guards against pathological matchers
const REGEX_SIZE_LIMIT: usize = 1 << 20;

// ============================================================================
// DOCUMENT
// ============================================================================

/// On-disk shape of the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: u32,
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
}

/// Built-in rules written by `init`
pub fn default_document() -> RegistryDocument {
    RegistryDocument {
        version: 1,
        patterns: vec![
            PatternRule::new(
                "repeated-file-reads",
                r"(?i)\bread(?:ing)?\s+(?:file\s+)?\S+\.\w+",
                3,
                Severity::Major,
                "batch-file-reads",
            )
            .with_description("Same files read again and again within one session")
            .corroborated_by("repeated-file-read"),
            PatternRule::new(
                "unnecessary-confirmation",
                r"(?i)\b(?:shall|should) i (?:proceed|continue)\b|\bdo you want me to (?:proceed|continue)\b",
                3,
                Severity::Minor,
                "act-without-asking",
            )
            .with_description("Asking permission for steps already requested")
            .corroborated_by("unnecessary-confirmation"),
            PatternRule::new(
                "repeated-test-failures",
                r"(?i)\btests? failed\b|\bFAILED\b",
                5,
                Severity::Critical,
                "triage-failing-tests",
            )
            .with_description("The same test suite failing repeatedly without a change in approach"),
            PatternRule::new(
                "command-retries",
                r"(?i)\bretry(?:ing)?\b|\bre-?running\b",
                4,
                Severity::Major,
                "stabilize-flaky-command",
            )
            .with_description("Commands retried without changing inputs")
            .corroborated_by("redundant-command"),
            PatternRule::new(
                "context-overflow",
                r"(?i)\bcontext (?:window )?(?:limit|overflow|compact(?:ed|ion))\b",
                2,
                Severity::Critical,
                "compact-context-early",
            )
            .with_description("Sessions running into the context limit"),
        ],
    }
}

// ============================================================================
// COMPILED SNAPSHOT
// ============================================================================

/// A rule plus its compiled matcher
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PatternRule,
    pub regex: Regex,
}

/// Immutable registry snapshot for one run
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    version: u32,
    /// sha256 of the source document, recorded in artifact provenance
    digest: String,
    rules: Vec<CompiledRule>,
}

impl PatternRegistry {
    /// Load and validate the registry file. Any problem is `ConfigInvalid`.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::config(
                path.display().to_string(),
                format!("cannot read pattern registry ({}); run `inefficiency init` to create one", e),
            )
        })?;

        let registry = Self::from_yaml(&path.display().to_string(), &content)?;
        log::info!(
            "Pattern registry v{} loaded: {} rule(s) from {:?}",
            registry.version,
            registry.rules.len(),
            path
        );
        Ok(registry)
    }

    pub fn from_yaml(source_name: &str, content: &str) -> EngineResult<Self> {
        let document: RegistryDocument = serde_yaml::from_str(content)
            .map_err(|e| EngineError::config(source_name, format!("malformed YAML: {}", e)))?;
        Self::compile(source_name, document, &digest_of(content.as_bytes()))
    }

    pub fn from_document(document: RegistryDocument) -> EngineResult<Self> {
        let serialized = serde_yaml::to_string(&document)?;
        Self::compile("<memory>", document, &digest_of(serialized.as_bytes()))
    }

    fn compile(source_name: &str, document: RegistryDocument, digest: &str) -> EngineResult<Self> {
        validate_rules(source_name, &document.patterns)?;

        let mut rules = Vec::with_capacity(document.patterns.len());
        for rule in document.patterns {
            let regex = compile_matcher(&rule.matcher).map_err(|e| {
                EngineError::config(
                    source_name,
                    format!("pattern '{}': matcher does not compile: {}", rule.name, e),
                )
            })?;
            rules.push(CompiledRule { rule, regex });
        }

        Ok(Self {
            version: document.version,
            digest: digest.to_string(),
            rules,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.rule.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============================================================================
// MUTATION (explicit approval only)
// ============================================================================

/// Append an approved rule to the registry file, bump its version and
/// rewrite it atomically. Returns the new version.
pub fn append_rule_to_file(path: &Path, rule: PatternRule) -> EngineResult<u32> {
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    let source_name = path.display().to_string();

    let mut document: RegistryDocument = serde_yaml::from_str(&content)
        .map_err(|e| EngineError::config(&source_name, format!("malformed YAML: {}", e)))?;

    if document.patterns.iter().any(|p| p.name == rule.name) {
        return Err(EngineError::config(
            &source_name,
            format!("pattern '{}' already exists; edit it in place instead", rule.name),
        ));
    }

    document.patterns.push(rule);
    document.version += 1;

    // Refuse to write a registry that would not load
    PatternRegistry::from_document(document.clone())?;

    let yaml = serde_yaml::to_string(&document)?;
    atomic_write(path, yaml.as_bytes())?;
    Ok(document.version)
}

/// Write a document (used by `init`)
pub fn write_document(path: &Path, document: &RegistryDocument) -> EngineResult<()> {
    let yaml = serde_yaml::to_string(document)?;
    atomic_write(path, yaml.as_bytes())
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn compile_matcher(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).size_limit(REGEX_SIZE_LIMIT).build()
}

fn digest_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('.')
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn validate_rules(source_name: &str, rules: &[PatternRule]) -> EngineResult<()> {
    let mut seen = HashSet::new();

    for rule in rules {
        if !is_identifier(&rule.name) {
            return Err(EngineError::config(
                source_name,
                format!("pattern name '{}' must be non-empty and use [A-Za-z0-9-_.]", rule.name),
            ));
        }
        if !seen.insert(rule.name.as_str()) {
            return Err(EngineError::config(
                source_name,
                format!("duplicate pattern name '{}'", rule.name),
            ));
        }
        if rule.threshold < 1 {
            return Err(EngineError::config(
                source_name,
                format!("pattern '{}': threshold must be >= 1", rule.name),
            ));
        }
        if rule.matcher.trim().is_empty() {
            return Err(EngineError::config(
                source_name,
                format!("pattern '{}': matcher is empty", rule.name),
            ));
        }
        if !is_identifier(&rule.remediation_id) {
            return Err(EngineError::config(
                source_name,
                format!("pattern '{}': remediation_id '{}' must use [A-Za-z0-9-_.]", rule.name, rule.remediation_id),
            ));
        }
        if !is_identifier(&rule.kind) {
            return Err(EngineError::config(
                source_name,
                format!("pattern '{}': kind '{}' must name a template file", rule.name, rule.kind),
            ));
        }
    }

    Ok(())
}
