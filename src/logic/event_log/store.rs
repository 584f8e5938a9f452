//! Event Log Store + Temporal Extractor
//!
//! Reads an append-only JSONL log whose physical order is not known up
//! front. The direction is verified once when the log is opened; every
//! extraction afterwards walks the records from the physical "oldest" end
//! so callers always get chronological output.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{EventRecord, Extraction, LogDirection, LogQuality};

// ============================================================================
// CONSTANTS
// ============================================================================

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Payloads that look like VCS merge/conflict noise rather than interaction
static MERGE_NOISE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?im)^\s*(?:merge (?:branch|pull request|remote-tracking branch)\b|auto-merging\b|conflict \(|<<<<<<< |>>>>>>> |=======\s*$)",
    )
    .ok()
});

pub fn is_merge_noise(payload: &str) -> bool {
    MERGE_NOISE
        .as_ref()
        .map(|re| re.is_match(payload))
        .unwrap_or(false)
}

// ============================================================================
// EVENT LOG
// ============================================================================

/// Read-only view over one log file
pub struct EventLog {
    path: PathBuf,
    /// Records in physical order
    records: Vec<EventRecord>,
    malformed_lines: usize,
    direction: Option<LogDirection>,
    ordering_inversions: usize,
    unavailable: Option<String>,
}

impl EventLog {
    /// Open and parse a log file. Never fails: an unreadable or empty log is
    /// remembered and reported as `LogUnavailable` on extraction.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut log = Self {
            path: path.clone(),
            records: Vec::new(),
            malformed_lines: 0,
            direction: None,
            ordering_inversions: 0,
            unavailable: None,
        };

        match read_records(&path) {
            Ok((records, malformed)) => {
                log.records = records;
                log.malformed_lines = malformed;
                if malformed > 0 {
                    log::warn!("{} malformed line(s) skipped in {:?}", malformed, path);
                }
            }
            Err(e) => {
                log::warn!("Event log {:?} unreadable: {}", path, e);
                log.unavailable = Some(e.to_string());
                return log;
            }
        }

        if log.records.is_empty() {
            log.unavailable = Some("log is empty".to_string());
            return log;
        }

        log.verify_direction();
        log
    }

    /// Build a log from records already in memory (physical order as given)
    pub fn from_records(path: impl Into<PathBuf>, records: Vec<EventRecord>) -> Self {
        let mut log = Self {
            path: path.into(),
            records,
            malformed_lines: 0,
            direction: None,
            ordering_inversions: 0,
            unavailable: None,
        };

        if log.records.is_empty() {
            log.unavailable = Some("log is empty".to_string());
        } else {
            log.verify_direction();
        }
        log
    }

    /// Compare the first and last physical records. Zero timestamps are
    /// uninitialized and skipped when picking the two ends.
    pub fn verify_direction(&mut self) -> Option<LogDirection> {
        let first = self.records.iter().find(|r| r.timestamp > 0);
        let last = self.records.iter().rev().find(|r| r.timestamp > 0);

        let direction = match (first, last) {
            (Some(first), Some(last)) if first.timestamp > last.timestamp => {
                LogDirection::NewestFirst
            }
            _ => LogDirection::OldestFirst,
        };

        self.direction = Some(direction);
        self.ordering_inversions = self.count_inversions();

        log::debug!(
            "Event log {:?}: {} records, {} ({} inversions)",
            self.path,
            self.records.len(),
            direction.as_str(),
            self.ordering_inversions
        );

        Some(direction)
    }

    pub fn direction(&self) -> Option<LogDirection> {
        self.direction
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records from the physical oldest end to the newest end
    fn chronological(&self) -> Box<dyn Iterator<Item = &EventRecord> + '_> {
        match self.direction {
            Some(LogDirection::NewestFirst) => Box::new(self.records.iter().rev()),
            _ => Box::new(self.records.iter()),
        }
    }

    fn count_inversions(&self) -> usize {
        let mut inversions = 0;
        let mut prev: Option<i64> = None;
        for record in self.chronological() {
            if record.timestamp <= 0 {
                continue;
            }
            if let Some(p) = prev {
                if record.timestamp < p {
                    inversions += 1;
                }
            }
            prev = Some(record.timestamp);
        }
        inversions
    }

    /// Records with `window_start <= timestamp <= window_end`, oldest first
    pub fn extract(&self, window_start: i64, window_end: i64) -> Extraction {
        if let Some(reason) = &self.unavailable {
            return Extraction::unavailable(window_start, window_end, reason.clone());
        }

        let mut events: Vec<EventRecord> = self
            .chronological()
            .filter(|r| r.timestamp >= window_start && r.timestamp <= window_end)
            .cloned()
            .collect();

        // Stable: ties keep their physical (oriented) order
        if self.ordering_inversions > 0 {
            events.sort_by_key(|r| r.timestamp);
        }

        let quality = self.window_quality(&events);

        Extraction {
            events,
            window_start,
            window_end,
            signal: None,
            quality,
        }
    }

    /// The `hours` hours ending at `now_ms`
    pub fn extract_hours(&self, hours: u64, now_ms: i64) -> Extraction {
        let span = i64::try_from(hours).unwrap_or(i64::MAX).saturating_mul(MS_PER_HOUR);
        self.extract(now_ms.saturating_sub(span), now_ms)
    }

    /// The `n` most recent records, oldest first. Read from whichever
    /// physical end holds the newest records.
    pub fn most_recent(&self, n: usize) -> Vec<EventRecord> {
        if !self.is_available() || n == 0 {
            return Vec::new();
        }

        let mut recent: Vec<EventRecord> = match self.direction {
            Some(LogDirection::NewestFirst) => self.records.iter().take(n).cloned().collect(),
            _ => self.records.iter().rev().take(n).cloned().collect(),
        };
        // Both branches collect newest first
        recent.reverse();
        recent
    }

    fn window_quality(&self, events: &[EventRecord]) -> LogQuality {
        LogQuality {
            malformed_lines: self.malformed_lines,
            // Uninitialized records never fall inside a real window, count them store-wide
            zero_timestamps: self.records.iter().filter(|r| r.timestamp == 0).count(),
            ordering_inversions: self.ordering_inversions,
            merge_noise_records: events.iter().filter(|r| is_merge_noise(&r.payload)).count(),
            window_records: events.len(),
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn read_records(path: &Path) -> std::io::Result<(Vec<EventRecord>, usize)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut malformed = 0;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => {
                malformed += 1;
                continue;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<EventRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(_) => malformed += 1,
        }
    }

    Ok((records, malformed))
}
