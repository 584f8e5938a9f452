//! Engine - one run of the pipeline
//!
//! Store -> Extractor -> Matcher -> Scorer -> gate -> Generator -> Updater,
//! with the auditor reading the same extractor output on the side. Its
//! recorded history of earlier sessions is one of the scorer's streams.
//!
//! Everything is loaded once in `Engine::open`; a registry or template
//! that does not parse stops the run before any work is done. After that,
//! failures are per pattern and collected into the run summary.

use super::report::{DetectReport, Detection, PatternFailure, RunSummary};
use super::setup::approval_queue;
use crate::constants::APP_VERSION;
use crate::error::{EngineError, EngineResult};
use crate::logic::approval::{ApprovalGate, ApprovalOutcome};
use crate::logic::artifact::{ArtifactGenerator, Generation, GenerationRequest, TemplateStore};
use crate::logic::audit::{
    independent_sessions, AuditHistory, AuditReport, CandidateRule, CandidateStore, EfficiencyAuditor,
};
use crate::logic::confidence::{
    score_cross_source, ApprovedAssertion, AuditViolationStream, EvidenceStream, GateDecision, SecondaryLogStream,
};
use crate::logic::config::EngineConfig;
use crate::logic::event_log::{EventLog, LogSignal};
use crate::logic::patterns::{match_window, PatternRegistry};
use crate::logic::registry_index::{RegistryIndex, RegistryUpdater};

/// What gating did for one detection
enum Gated {
    Approved(ApprovedAssertion),
    Held(String),
    Refused(EngineError),
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    registry: PatternRegistry,
    log: EventLog,
    secondary_log: EventLog,
    auditor: EfficiencyAuditor,
    generator: ArtifactGenerator,
    updater: RegistryUpdater,
    gate: Box<dyn ApprovalGate>,
    history: AuditHistory,
    candidates: CandidateStore,
}

impl Engine {
    /// Load configuration, registry, templates and logs. Only
    /// `ConfigInvalid` comes out of here.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let registry = PatternRegistry::load(&config.pattern_registry_path())?;
        let templates = TemplateStore::new(config.templates_dir());
        templates.validate_all()?;

        let updater = RegistryUpdater::new(config.registry_index_path(), config.lock_policy());
        // An unreadable index must stop the run before anything is appended
        let index = updater.read()?;

        let log = EventLog::open(config.event_log_path());
        let secondary_log = EventLog::open(config.secondary_log_path());
        let auditor = EfficiencyAuditor::new()?;

        let generator = ArtifactGenerator::new(config.artifacts_dir(), templates, updater.clone());
        let gate = Box::new(approval_queue(&config));
        let history = AuditHistory::new(config.audit_history_path());
        let candidates = CandidateStore::new(config.candidates_path(), config.lock_policy());

        log::info!(
            "Engine v{} ready: registry v{} ({} rules), {} event(s), index revision {}",
            APP_VERSION,
            registry.version(),
            registry.len(),
            log.len(),
            index.revision
        );

        Ok(Self {
            config,
            registry,
            log,
            secondary_log,
            auditor,
            generator,
            updater,
            gate,
            history,
            candidates,
        })
    }

    /// Swap the manual approval gate
    pub fn with_approval_gate(mut self, gate: Box<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn index(&self) -> EngineResult<RegistryIndex> {
        self.updater.read()
    }

    // ------------------------------------------------------------------------
    // detect
    // ------------------------------------------------------------------------

    /// Match and score the `window_hours` ending at `now_ms`. Read-only.
    pub fn detect(&self, window_hours: u64, now_ms: i64) -> EngineResult<DetectReport> {
        let extraction = self.log.extract_hours(window_hours, now_ms);
        let log_unavailable = match &extraction.signal {
            Some(LogSignal::LogUnavailable { reason }) => Some(reason.clone()),
            None => None,
        };

        let outcome = match_window(&extraction.events, &self.registry, self.config.max_workers);

        // Audit sessions outside this window only; the window itself is the
        // primary evidence
        let earlier = self.history.load()?;
        let sessions = independent_sessions(
            earlier
                .iter()
                .filter(|r| !r.overlaps(extraction.window_start, extraction.window_end)),
        );
        let audit_stream = AuditViolationStream::new(sessions);
        let secondary = self
            .secondary_log
            .extract(extraction.window_start, extraction.window_end);
        let secondary_stream = SecondaryLogStream::new("tool-calls", secondary.events);
        let streams: [&dyn EvidenceStream; 2] = [&secondary_stream, &audit_stream];

        let index = self.updater.read()?;
        let policy = self.config.gate_policy();

        let mut detections = Vec::with_capacity(outcome.fired.len());
        for evidence in outcome.fired {
            let Some(rule) = self.registry.get(&evidence.pattern_name) else {
                continue;
            };
            let assertion = score_cross_source(rule, &evidence, &streams, &extraction.quality);
            let decision = policy.decide(assertion.score);

            match decision {
                GateDecision::Generate => {}
                GateDecision::ManualReview => log::info!(
                    "Pattern '{}' scored {}: manual approval required",
                    evidence.pattern_name,
                    assertion.score
                ),
                GateDecision::Discard => log::info!(
                    "Pattern '{}' scored {}: below review floor, discarded",
                    evidence.pattern_name,
                    assertion.score
                ),
            }

            detections.push(Detection {
                remediated_by: index
                    .find_by_pattern(&evidence.pattern_name)
                    .map(|e| e.artifact_id.clone()),
                evidence,
                assertion,
                decision,
            });
        }

        Ok(DetectReport {
            engine_version: APP_VERSION.to_string(),
            registry_version: self.registry.version(),
            window_start: extraction.window_start,
            window_end: extraction.window_end,
            events_scanned: outcome.events_scanned,
            log_unavailable,
            quality: extraction.quality,
            detections,
            below_threshold: outcome.below_threshold,
        })
    }

    // ------------------------------------------------------------------------
    // generate
    // ------------------------------------------------------------------------

    /// Generate the artifact for one named pattern. A pattern that is
    /// already remediated comes back as `Generation::Existing` untouched.
    pub fn generate(&self, pattern_name: &str, now_ms: i64) -> EngineResult<Generation> {
        if !self.registry.contains(pattern_name) {
            return Err(EngineError::UnknownPattern(pattern_name.to_string()));
        }

        if let Some(existing) = self.generator.existing(pattern_name)? {
            return Ok(Generation::Existing(existing));
        }

        let report = self.detect(self.config.window_hours, now_ms)?;
        let detection = report.get(pattern_name).ok_or_else(|| EngineError::NotDetected {
            pattern: pattern_name.to_string(),
        })?;

        match self.gate_detection(detection)? {
            Gated::Approved(approved) => self.generate_approved(&approved, detection),
            Gated::Held(note) => {
                log::info!("{}", note);
                Err(EngineError::BelowGate {
                    pattern: pattern_name.to_string(),
                    score: detection.assertion.score,
                    threshold: self.config.approval_threshold,
                })
            }
            Gated::Refused(err) => Err(err),
        }
    }

    fn gate_detection(&self, detection: &Detection) -> EngineResult<Gated> {
        let policy = self.config.gate_policy();
        let pattern_name = detection.pattern_name();

        match detection.decision {
            GateDecision::Generate => match ApprovedAssertion::from_gate(detection.assertion.clone(), &policy) {
                Ok(approved) => Ok(Gated::Approved(approved)),
                Err(assertion) => Ok(Gated::Refused(EngineError::BelowGate {
                    pattern: pattern_name.to_string(),
                    score: assertion.score,
                    threshold: policy.approval_threshold,
                })),
            },
            GateDecision::ManualReview => match self.gate.request(detection.assertion.clone(), &policy)? {
                ApprovalOutcome::Approved(approved) => Ok(Gated::Approved(approved)),
                ApprovalOutcome::Pending { expires_at } => Ok(Gated::Held(format!(
                    "Pattern '{}' awaits manual approval until {} (inefficiency approve {})",
                    pattern_name,
                    expires_at.to_rfc3339(),
                    pattern_name
                ))),
                ApprovalOutcome::Rejected { approver } => Ok(Gated::Held(format!(
                    "Pattern '{}' was rejected by {}",
                    pattern_name, approver
                ))),
                ApprovalOutcome::TimedOut => Ok(Gated::Held(format!(
                    "Pattern '{}' got no decision in time and was discarded",
                    pattern_name
                ))),
            },
            GateDecision::Discard => Ok(Gated::Refused(EngineError::BelowGate {
                pattern: pattern_name.to_string(),
                score: detection.assertion.score,
                threshold: policy.approval_threshold,
            })),
        }
    }

    fn generate_approved(&self, approved: &ApprovedAssertion, detection: &Detection) -> EngineResult<Generation> {
        let compiled = self
            .registry
            .get(detection.pattern_name())
            .ok_or_else(|| EngineError::UnknownPattern(detection.pattern_name().to_string()))?;

        self.generator.generate(&GenerationRequest {
            approved,
            rule: &compiled.rule,
            evidence: &detection.evidence,
            registry: &self.registry,
        })
    }

    // ------------------------------------------------------------------------
    // audit
    // ------------------------------------------------------------------------

    /// Audit the session window, record it, and propose candidates for
    /// violations that keep recurring
    pub fn audit(&self, window_hours: u64, now_ms: i64) -> EngineResult<(AuditReport, Vec<CandidateRule>)> {
        let extraction = self.log.extract_hours(window_hours, now_ms);
        let report = self
            .auditor
            .audit(&extraction.events, extraction.window_start, extraction.window_end);

        self.history.append(&report)?;
        let history = self.history.load()?;
        let proposed = self
            .candidates
            .propose(&history, self.auditor.rules().map(|r| &r.rule), &self.registry)?;

        Ok((report, proposed))
    }

    // ------------------------------------------------------------------------
    // cycle
    // ------------------------------------------------------------------------

    /// detect -> generate the highest-priority approved pattern (or every
    /// approved pattern with `all`) -> audit
    pub fn cycle(&self, all: bool, now_ms: i64) -> EngineResult<RunSummary> {
        let detect = self.detect(self.config.window_hours, now_ms)?;

        let mut generated = Vec::new();
        let mut held = Vec::new();
        let mut failures = Vec::new();

        let open = detect
            .detections
            .iter()
            .filter(|d| d.remediated_by.is_none() && d.decision != GateDecision::Discard);

        for detection in open {
            let name = detection.pattern_name();
            let result = self
                .gate_detection(detection)
                .and_then(|gated| match gated {
                    Gated::Approved(approved) => self.generate_approved(&approved, detection).map(Some),
                    Gated::Held(note) => {
                        log::info!("{}", note);
                        held.push(name.to_string());
                        Ok(None)
                    }
                    Gated::Refused(err) => Err(err),
                });

            match result {
                Ok(Some(generation)) => {
                    generated.push(generation.artifact().id.clone());
                    if !all {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    log::error!("Pattern '{}' failed: {}", name, err);
                    failures.push(PatternFailure::from_error(name, &err));
                }
            }
        }

        let (audit, new_candidates) = match self.audit(self.config.audit_window_hours, now_ms) {
            Ok((report, proposed)) => (Some(report), proposed.into_iter().map(|c| c.rule.name).collect()),
            Err(err) => {
                log::error!("Audit failed: {}", err);
                failures.push(PatternFailure::from_error("<audit>", &err));
                (None, Vec::new())
            }
        };

        Ok(RunSummary {
            detect,
            generated,
            held,
            failures,
            audit,
            new_candidates,
        })
    }

    // ------------------------------------------------------------------------
    // feedback loop
    // ------------------------------------------------------------------------

    pub fn candidates(&self) -> EngineResult<Vec<CandidateRule>> {
        self.candidates.load()
    }
}

