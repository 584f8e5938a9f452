//! CLI Commands - one function per subcommand
//!
//! Each command opens what it needs, runs, and returns a `CommandOutput`
//! holding the exit code plus a text and a JSON rendering of the result.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::EngineError;
use crate::logic::approval::Verdict;
use crate::logic::artifact::Generation;
use crate::logic::audit::{AuditReport, CandidateRule};
use crate::logic::config::EngineConfig;
use crate::logic::engine::{
    approval_queue, candidate_store, init_data_dir, DetectReport, Engine, RunSummary,
};
use crate::logic::registry_index::{RegistryIndex, RegistryUpdater};

// ============================================================================
// OUTPUT
// ============================================================================

/// Exit code used by `audit` for anything that is not a grade
pub const AUDIT_HARD_FAILURE: i32 = 4;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub text: String,
    pub json: serde_json::Value,
}

impl CommandOutput {
    fn new(exit_code: i32, text: String, json: serde_json::Value) -> Self {
        Self { exit_code, text, json }
    }

    fn error(exit_code: i32, err: &EngineError) -> Self {
        log::error!("{}", err);
        Self::new(exit_code, format!("error: {}", err), json!({ "error": err.to_string() }))
    }

    pub fn render(&self, as_json: bool) -> String {
        if as_json {
            serde_json::to_string_pretty(&self.json).unwrap_or_else(|_| self.json.to_string())
        } else {
            self.text.clone()
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

// ============================================================================
// PIPELINE COMMANDS
// ============================================================================

/// `detect`: exit 0 unless the engine cannot be opened or read (1)
pub fn detect(config: &EngineConfig, window_hours: Option<u64>) -> CommandOutput {
    let result = Engine::open(config.clone())
        .and_then(|engine| engine.detect(window_hours.unwrap_or(config.window_hours), now_ms()));

    match result {
        Ok(report) => CommandOutput::new(0, render_detect(&report), to_json(&report)),
        Err(err) => CommandOutput::error(1, &err),
    }
}

/// `generate <pattern>`: 0 only when this call wrote the artifact
pub fn generate(config: &EngineConfig, pattern_name: &str) -> CommandOutput {
    let result = Engine::open(config.clone()).and_then(|engine| engine.generate(pattern_name, now_ms()));

    match result {
        Ok(Generation::Created(artifact)) => CommandOutput::new(
            0,
            format!(
                "Generated artifact '{}' for pattern '{}' (confidence {})",
                artifact.id, artifact.source_pattern, artifact.assertion.score
            ),
            json!({ "status": "created", "artifact": to_json(&artifact) }),
        ),
        Ok(Generation::Existing(artifact)) => {
            let err = EngineError::AlreadyRemediated {
                pattern: artifact.source_pattern.clone(),
                artifact_id: artifact.id.clone(),
            };
            CommandOutput::new(
                1,
                err.to_string(),
                json!({ "status": "existing", "artifact": to_json(&artifact) }),
            )
        }
        Err(err) => CommandOutput::error(1, &err),
    }
}

/// `audit [window-hours]`: exit code is the grade band, 4 on failure
pub fn audit(config: &EngineConfig, window_hours: Option<u64>) -> CommandOutput {
    let result = Engine::open(config.clone())
        .and_then(|engine| engine.audit(window_hours.unwrap_or(config.audit_window_hours), now_ms()));

    match result {
        Ok((report, proposed)) => CommandOutput::new(
            report.grade.exit_code(),
            render_audit(&report, &proposed),
            json!({ "report": to_json(&report), "new_candidates": to_json(&proposed) }),
        ),
        Err(err) => CommandOutput::error(AUDIT_HARD_FAILURE, &err),
    }
}

/// `cycle [--all]`: exit 1 on any hard failure
pub fn cycle(config: &EngineConfig, all: bool) -> CommandOutput {
    match Engine::open(config.clone()).and_then(|engine| engine.cycle(all, now_ms())) {
        Ok(summary) => {
            let code = if summary.has_hard_failure() { 1 } else { 0 };
            CommandOutput::new(code, render_cycle(&summary), to_json(&summary))
        }
        Err(err) => CommandOutput::error(1, &err),
    }
}

// ============================================================================
// MANUAL APPROVAL
// ============================================================================

/// `approvals`: list requests waiting for a human
pub fn approvals(config: &EngineConfig) -> CommandOutput {
    match approval_queue(config).pending() {
        Ok(pending) => {
            let mut text = String::new();
            if pending.is_empty() {
                text.push_str("No pending approvals");
            }
            for req in &pending {
                let _ = writeln!(
                    text,
                    "{:<32} score {:>3}  expires {}",
                    req.pattern_name,
                    req.assertion.score,
                    req.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
            }
            CommandOutput::new(0, text.trim_end().to_string(), to_json(&pending))
        }
        Err(err) => CommandOutput::error(1, &err),
    }
}

/// `approve` / `reject`: record a verdict; an approval is acted on by the
/// next `generate` or `cycle`
pub fn decide(config: &EngineConfig, pattern_name: &str, verdict: Verdict, approver: &str) -> CommandOutput {
    match approval_queue(config).decide(pattern_name, verdict, approver) {
        Ok(decision) => {
            let text = match verdict {
                Verdict::Approved => format!(
                    "Approved '{}'; run `inefficiency generate {}` to produce the artifact",
                    pattern_name, pattern_name
                ),
                Verdict::Rejected => format!("Rejected '{}'", pattern_name),
            };
            CommandOutput::new(0, text, to_json(&decision))
        }
        Err(err) => CommandOutput::error(1, &err),
    }
}

// ============================================================================
// FEEDBACK LOOP
// ============================================================================

pub fn candidates(config: &EngineConfig) -> CommandOutput {
    match candidate_store(config).load() {
        Ok(list) => {
            let mut text = String::new();
            if list.is_empty() {
                text.push_str("No candidate rules");
            }
            for c in &list {
                let _ = writeln!(
                    text,
                    "{:<32} {:<9} {:<8} seen in {} sessions  matcher {}",
                    c.name(),
                    format!("{:?}", c.status).to_lowercase(),
                    c.rule.severity,
                    c.runs_seen,
                    c.rule.matcher
                );
            }
            CommandOutput::new(0, text.trim_end().to_string(), to_json(&list))
        }
        Err(err) => CommandOutput::error(1, &err),
    }
}

pub fn approve_candidate(config: &EngineConfig, name: &str) -> CommandOutput {
    match candidate_store(config).approve(name, &config.pattern_registry_path()) {
        Ok((candidate, version)) => CommandOutput::new(
            0,
            format!("Added '{}' to the pattern registry (now v{})", candidate.name(), version),
            json!({ "candidate": to_json(&candidate), "registry_version": version }),
        ),
        Err(err) => CommandOutput::error(1, &err),
    }
}

pub fn reject_candidate(config: &EngineConfig, name: &str) -> CommandOutput {
    match candidate_store(config).reject(name) {
        Ok(candidate) => CommandOutput::new(0, format!("Rejected candidate '{}'", name), to_json(&candidate)),
        Err(err) => CommandOutput::error(1, &err),
    }
}

// ============================================================================
// HOUSEKEEPING
// ============================================================================

pub fn index(config: &EngineConfig) -> CommandOutput {
    match RegistryUpdater::new(config.registry_index_path(), config.lock_policy()).read() {
        Ok(index) => CommandOutput::new(0, render_index(&index), to_json(&index)),
        Err(err) => CommandOutput::error(1, &err),
    }
}

pub fn init(config: &EngineConfig) -> CommandOutput {
    match init_data_dir(config) {
        Ok(created) => {
            let mut text = format!("Data directory: {}", config.data_dir().display());
            for path in &created {
                let _ = write!(text, "\n  created {}", path.display());
            }
            CommandOutput::new(0, text, json!({ "data_dir": config.data_dir(), "created": created }))
        }
        Err(err) => CommandOutput::error(1, &err),
    }
}

// ============================================================================
// TEXT RENDERING
// ============================================================================

fn render_detect(report: &DetectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Window {} .. {}: {} event(s), registry v{}",
        format_ms(report.window_start),
        format_ms(report.window_end),
        report.events_scanned,
        report.registry_version
    );

    if let Some(reason) = &report.log_unavailable {
        let _ = writeln!(out, "Event log unavailable ({}); nothing to detect", reason);
    }

    if report.detections.is_empty() {
        let _ = writeln!(out, "No patterns fired");
    }

    for d in &report.detections {
        let status = match &d.remediated_by {
            Some(id) => format!("remediated by {}", id),
            None => d.decision.as_str().to_string(),
        };
        let _ = writeln!(
            out,
            "[{:<8}] {:<32} count {:>4}/{:<4} confidence {:>3}  {}",
            d.evidence.severity,
            d.pattern_name(),
            d.evidence.count,
            d.evidence.threshold,
            d.assertion.score,
            status
        );
        for warning in &d.assertion.warnings {
            let _ = writeln!(out, "           warning: {}", warning);
        }
    }

    for sub in &report.below_threshold {
        let _ = writeln!(
            out,
            "  below threshold: {} ({}/{})",
            sub.pattern_name, sub.count, sub.threshold
        );
    }

    out.trim_end().to_string()
}

fn render_audit(report: &AuditReport, proposed: &[CandidateRule]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Audit {}: {} event(s), score {}, grade {}",
        report.run_id, report.events_audited, report.score, report.grade
    );
    for (rule_id, count) in report.counts() {
        let _ = writeln!(out, "  {:<28} x{}", rule_id, count);
    }
    for c in proposed {
        let _ = writeln!(
            out,
            "New candidate rule '{}' (approve with `inefficiency approve-candidate {}`)",
            c.name(),
            c.name()
        );
    }
    out.trim_end().to_string()
}

fn render_cycle(summary: &RunSummary) -> String {
    let mut out = render_detect(&summary.detect);
    out.push('\n');

    for id in &summary.generated {
        let _ = writeln!(out, "Generated {}", id);
    }
    for name in &summary.held {
        let _ = writeln!(out, "Held for manual approval: {}", name);
    }
    for failure in &summary.failures {
        let _ = writeln!(
            out,
            "Failed {}{}: {}",
            failure.pattern_name,
            if failure.hard { " (hard)" } else { "" },
            failure.message
        );
    }
    if let Some(audit) = &summary.audit {
        let _ = writeln!(out, "Audit score {} ({})", audit.score, audit.grade);
    }
    for name in &summary.new_candidates {
        let _ = writeln!(out, "New candidate rule '{}'", name);
    }
    out.trim_end().to_string()
}

fn render_index(index: &RegistryIndex) -> String {
    let mut out = format!("Registry index revision {} ({} entries)", index.revision, index.len());
    for e in &index.entries {
        let _ = write!(
            out,
            "\n  {:<32} <- {:<32} {}",
            e.artifact_id,
            e.pattern_name,
            e.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> EngineConfig {
        EngineConfig::default().with_data_dir(dir)
    }

    #[test]
    fn test_detect_without_init_exits_one() {
        let dir = tempdir().unwrap();
        let out = detect(&config(dir.path()), None);
        assert_eq!(out.exit_code, 1);
        assert!(out.text.contains("inefficiency init"));
    }

    #[test]
    fn test_detect_on_empty_log_exits_zero() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        assert_eq!(init(&cfg).exit_code, 0);

        let out = detect(&cfg, Some(12));
        assert_eq!(out.exit_code, 0);
        assert!(out.text.contains("unavailable"));
        assert!(out.json.get("detections").is_some());
    }

    #[test]
    fn test_audit_exit_codes() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        assert_eq!(audit(&cfg, None).exit_code, AUDIT_HARD_FAILURE);

        init(&cfg);
        assert_eq!(audit(&cfg, None).exit_code, 0);
    }

    #[test]
    fn test_generate_unknown_pattern_exits_one() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        init(&cfg);

        let out = generate(&cfg, "nope");
        assert_eq!(out.exit_code, 1);
        assert!(out.text.contains("unknown pattern 'nope'"));
    }

    #[test]
    fn test_approve_without_request_exits_one() {
        let dir = tempdir().unwrap();
        let out = decide(&config(dir.path()), "x", Verdict::Approved, "alice");
        assert_eq!(out.exit_code, 1);
        assert!(out.render(true).contains("error"));
    }

    #[test]
    fn test_index_and_candidates_empty() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        assert!(index(&cfg).text.contains("revision 0"));
        assert_eq!(candidates(&cfg).text, "No candidate rules");
        assert_eq!(approvals(&cfg).text, "No pending approvals");
    }
}
