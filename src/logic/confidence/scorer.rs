//! Confidence Scorer
//!
//! Additive, deterministic scoring. Every point that moves the score is
//! recorded as a named factor so provenance can explain it.
//!
//! | factor              | points                         |
//! |---------------------|--------------------------------|
//! | `occurrences`       | 40 (>= 5), 25 (2-4), 10 (0-1)  |
//! | `severity`          | +20 for critical               |
//! | `stream:<name>`     | up to +30 per evidence stream  |
//! | `merge_noise`       | -10 when noise ratio > 25%     |
//! | `anomalous_source`  | -15 for a damaged log          |

use std::collections::BTreeMap;

use super::streams::EvidenceStream;
use super::types::{ConfidenceAssertion, Corroboration};
use crate::logic::event_log::LogQuality;
use crate::logic::patterns::{CompiledRule, EvidenceSet, Severity};

// ============================================================================
// CONSTANTS
// ============================================================================

const BASE_HIGH: i32 = 40;
const BASE_MEDIUM: i32 = 25;
const BASE_LOW: i32 = 10;

const CRITICAL_BONUS: i32 = 20;

/// Ceiling for any single evidence stream
pub const STREAM_CAP: u8 = 30;

const MERGE_NOISE_RATIO: f32 = 0.25;
const MERGE_NOISE_PENALTY: i32 = -10;
const ANOMALOUS_SOURCE_PENALTY: i32 = -15;

/// Volume that suggests a matcher which is too broad
const VOLUME_THRESHOLD_MULTIPLE: usize = 50;
const VOLUME_ABSOLUTE: usize = 1000;

pub const FACTOR_OCCURRENCES: &str = "occurrences";
pub const FACTOR_SEVERITY: &str = "severity";
pub const FACTOR_MERGE_NOISE: &str = "merge_noise";
pub const FACTOR_ANOMALOUS_SOURCE: &str = "anomalous_source";

// ============================================================================
// PUBLIC API
// ============================================================================

/// Base points for an occurrence count
pub fn base_points(count: usize) -> i32 {
    match count {
        0..=1 => BASE_LOW,
        2..=4 => BASE_MEDIUM,
        _ => BASE_HIGH,
    }
}

/// Score one Evidence Set from its count, already gathered corroborations
/// and the quality of the window it came from.
pub fn score(evidence: &EvidenceSet, corroborations: &[Corroboration], quality: &LogQuality) -> ConfidenceAssertion {
    let mut factors = BTreeMap::new();
    let mut warnings = Vec::new();

    factors.insert(FACTOR_OCCURRENCES.to_string(), base_points(evidence.count));

    if evidence.severity == Severity::Critical {
        factors.insert(FACTOR_SEVERITY.to_string(), CRITICAL_BONUS);
    }

    for c in corroborations {
        let points = c.points.min(STREAM_CAP) as i32;
        if points > 0 {
            let key = format!("stream:{}", c.source);
            let entry = factors.entry(key).or_insert(0);
            // Two reports for one stream still share one cap
            *entry = (*entry + points).min(STREAM_CAP as i32);
        }
    }

    if quality.merge_noise_ratio() > MERGE_NOISE_RATIO {
        factors.insert(FACTOR_MERGE_NOISE.to_string(), MERGE_NOISE_PENALTY);
    }

    if quality.is_anomalous() {
        factors.insert(FACTOR_ANOMALOUS_SOURCE.to_string(), ANOMALOUS_SOURCE_PENALTY);
        warnings.push(format!(
            "event log looks damaged: {} malformed line(s), {} zero timestamp(s), {} ordering inversion(s)",
            quality.malformed_lines, quality.zero_timestamps, quality.ordering_inversions
        ));
    }

    let volume_limit = (evidence.threshold as usize)
        .saturating_mul(VOLUME_THRESHOLD_MULTIPLE)
        .min(VOLUME_ABSOLUTE);
    if evidence.count >= volume_limit {
        warnings.push(format!(
            "excessive volume: {} matches against threshold {}; the matcher may be too broad",
            evidence.count, evidence.threshold
        ));
    }

    let total: i32 = factors.values().sum();
    let score = total.clamp(0, 100) as u8;

    log::debug!("Scored '{}' at {} ({:?})", evidence.pattern_name, score, factors);

    ConfidenceAssertion {
        pattern_name: evidence.pattern_name.clone(),
        score,
        contributing_factors: factors,
        warnings,
    }
}

/// Gather corroboration from every stream, then score
pub fn score_cross_source(
    rule: &CompiledRule,
    evidence: &EvidenceSet,
    streams: &[&dyn EvidenceStream],
    quality: &LogQuality,
) -> ConfidenceAssertion {
    let corroborations: Vec<Corroboration> = streams
        .iter()
        .filter_map(|s| s.corroborate(rule))
        .collect();

    score(evidence, &corroborations, quality)
}
