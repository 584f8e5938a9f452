//! Artifact templates
//!
//! `templates/<kind>.md` files with `{{FIELD}}` markers. Substitution runs
//! over the parsed template, so values are inserted verbatim and never
//! re-scanned for markers. Any marker that could not be resolved fails the
//! whole render.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};

// ============================================================================
// FIELDS
// ============================================================================

/// Every value a template can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    PatternName,
    ArtifactId,
    RemediationId,
    Severity,
    Description,
    Matcher,
    Threshold,
    OccurrenceCount,
    Confidence,
    ConfidenceFactors,
    Evidence,
    EvidenceRefs,
    CreatedAt,
    RegistryVersion,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::PatternName,
        Field::ArtifactId,
        Field::RemediationId,
        Field::Severity,
        Field::Description,
        Field::Matcher,
        Field::Threshold,
        Field::OccurrenceCount,
        Field::Confidence,
        Field::ConfidenceFactors,
        Field::Evidence,
        Field::EvidenceRefs,
        Field::CreatedAt,
        Field::RegistryVersion,
    ];

    pub fn marker(&self) -> &'static str {
        match self {
            Field::PatternName => "PATTERN_NAME",
            Field::ArtifactId => "ARTIFACT_ID",
            Field::RemediationId => "REMEDIATION_ID",
            Field::Severity => "SEVERITY",
            Field::Description => "DESCRIPTION",
            Field::Matcher => "MATCHER",
            Field::Threshold => "THRESHOLD",
            Field::OccurrenceCount => "OCCURRENCE_COUNT",
            Field::Confidence => "CONFIDENCE",
            Field::ConfidenceFactors => "CONFIDENCE_FACTORS",
            Field::Evidence => "EVIDENCE",
            Field::EvidenceRefs => "EVIDENCE_REFS",
            Field::CreatedAt => "CREATED_AT",
            Field::RegistryVersion => "REGISTRY_VERSION",
        }
    }

    pub fn from_marker(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.marker() == name)
    }
}

pub type FieldMap = BTreeMap<Field, String>;

// ============================================================================
// PARSED TEMPLATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Marker(String),
}

#[derive(Debug, Clone)]
pub struct Template {
    kind: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template source. Unbalanced or malformed markers are a
    /// configuration error.
    pub fn parse(kind: &str, source: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut line = 1;

        while let Some(open) = rest.find("{{") {
            let (text, after_open) = rest.split_at(open);
            if let Some(pos) = text.find("}}") {
                return Err(format!("line {}: '}}}}' without matching '{{{{'", line + text[..pos].matches('\n').count()));
            }
            line += text.matches('\n').count();
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }

            let body = &after_open[2..];
            let close = body
                .find("}}")
                .ok_or_else(|| format!("line {}: '{{{{' is never closed", line))?;
            let name = body[..close].trim();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
                return Err(format!("line {}: invalid marker '{{{{{}}}}}', use UPPER_SNAKE_CASE", line, &body[..close]));
            }
            segments.push(Segment::Marker(name.to_string()));
            rest = &body[close + 2..];
        }

        if let Some(pos) = rest.find("}}") {
            return Err(format!("line {}: '}}}}' without matching '{{{{'", line + rest[..pos].matches('\n').count()));
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            kind: kind.to_string(),
            segments,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Marker names in order of appearance
    pub fn markers(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Marker(m) => Some(m.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Substitute every marker, then check the output. Returns the first
    /// unresolved marker name when the map cannot satisfy the template or
    /// when a substituted value carried a marker of its own.
    pub fn render(&self, fields: &FieldMap) -> Result<String, String> {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Marker(name) => match Field::from_marker(name).and_then(|f| fields.get(&f)) {
                    Some(value) => out.push_str(value),
                    None => return Err(name.clone()),
                },
            }
        }

        match leftover_marker(&out) {
            Some(marker) => Err(marker),
            None => Ok(out),
        }
    }
}

/// First `{{...}}` still present in rendered text
fn leftover_marker(text: &str) -> Option<String> {
    let open = text.find("{{")?;
    let body = &text[open + 2..];
    let close = body.find("}}")?;
    Some(body[..close].trim().to_string())
}

// ============================================================================
// STORE
// ============================================================================

/// Directory of `<kind>.md` templates
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{}.md", kind))
    }

    /// `Ok(None)` when there is no template for `kind`
    pub fn load(&self, kind: &str) -> EngineResult<Option<Template>> {
        let path = self.path_for(kind);
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::io(&path, e)),
        };

        Template::parse(kind, &source)
            .map(Some)
            .map_err(|msg| EngineError::config(path.display().to_string(), msg))
    }

    /// Parse every template once at startup so syntax errors surface as
    /// `ConfigInvalid` before any work starts. Returns the kinds found.
    pub fn validate_all(&self) -> EngineResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(&self.dir, e)),
        };

        let mut kinds = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(kind) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.load(kind)?.is_some() {
                kinds.push(kind.to_string());
            }
        }

        kinds.sort();
        log::debug!("Validated {} template(s) in {:?}", kinds.len(), self.dir);
        Ok(kinds)
    }
}

// ============================================================================
// DEFAULTS
// ============================================================================

/// Templates written by `init`
pub fn default_templates() -> Vec<(&'static str, &'static str)> {
    vec![("skill", DEFAULT_SKILL_TEMPLATE)]
}

const DEFAULT_SKILL_TEMPLATE: &str = r#"---
name: {{ARTIFACT_ID}}
source_pattern: {{PATTERN_NAME}}
severity: {{SEVERITY}}
confidence: {{CONFIDENCE}}
created_at: {{CREATED_AT}}
registry_version: {{REGISTRY_VERSION}}
---

# {{REMEDIATION_ID}}

{{DESCRIPTION}}

## Trigger

Pattern `{{PATTERN_NAME}}` matched {{OCCURRENCE_COUNT}} time(s) against a
threshold of {{THRESHOLD}}.

Matcher: `{{MATCHER}}`

## Confidence

{{CONFIDENCE_FACTORS}}

## Evidence

{{EVIDENCE}}

Event ids: {{EVIDENCE_REFS}}
"#;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_inserts_values_verbatim() {
        let template = Template::parse("skill", "# {{PATTERN_NAME}}\n{{EVIDENCE}}\n").unwrap();
        let mut fields = FieldMap::new();
        fields.insert(Field::PatternName, "reads".to_string());
        fields.insert(Field::Evidence, "fn main() { println!(\"{}\", x) }".to_string());

        let body = template.render(&fields).unwrap();
        assert_eq!(body, "# reads\nfn main() { println!(\"{}\", x) }\n");
    }

    #[test]
    fn test_render_rejects_marker_carried_by_value() {
        let template = Template::parse("skill", "# {{PATTERN_NAME}}\n{{EVIDENCE}}\n").unwrap();
        let mut fields = FieldMap::new();
        fields.insert(Field::PatternName, "reads".to_string());
        fields.insert(Field::Evidence, "hit the context limit {{OWNER}}".to_string());
        assert_eq!(template.render(&fields).unwrap_err(), "OWNER");

        // Never substituted, even when the name is a known field
        fields.insert(Field::Evidence, "see {{ PATTERN_NAME }}".to_string());
        assert_eq!(template.render(&fields).unwrap_err(), "PATTERN_NAME");
    }

    #[test]
    fn test_render_reports_unknown_marker() {
        let template = Template::parse("skill", "{{PATTERN_NAME}} owned by {{OWNER}}").unwrap();
        let mut fields = FieldMap::new();
        fields.insert(Field::PatternName, "reads".to_string());

        assert_eq!(template.render(&fields).unwrap_err(), "OWNER");
    }

    #[test]
    fn test_render_reports_missing_value() {
        let template = Template::parse("skill", "{{CONFIDENCE}}").unwrap();
        assert_eq!(template.render(&FieldMap::new()).unwrap_err(), "CONFIDENCE");
    }

    #[test]
    fn test_parse_rejects_bad_syntax() {
        assert!(Template::parse("skill", "{{PATTERN_NAME").is_err());
        assert!(Template::parse("skill", "oops }} here").is_err());
        assert!(Template::parse("skill", "{{lower}}").is_err());
        assert!(Template::parse("skill", "{{}}").is_err());
    }

    #[test]
    fn test_default_template_uses_known_fields_only() {
        for (kind, source) in default_templates() {
            let template = Template::parse(kind, source).unwrap();
            for marker in template.markers() {
                assert!(Field::from_marker(marker).is_some(), "unknown marker {}", marker);
            }
        }
    }

    #[test]
    fn test_store_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        assert!(store.load("skill").unwrap().is_none());

        std::fs::write(dir.path().join("skill.md"), DEFAULT_SKILL_TEMPLATE).unwrap();
        assert_eq!(store.validate_all().unwrap(), vec!["skill".to_string()]);

        std::fs::write(dir.path().join("broken.md"), "{{NEVER_CLOSED").unwrap();
        assert!(store.validate_all().unwrap_err().is_fatal());
    }
}
