//! Event Log Types
//!
//! Data structures only - no I/O here.

use serde::{Deserialize, Serialize};

// ============================================================================
// EVENT RECORD
// ============================================================================

/// Who produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::User => "user",
            Actor::System => "system",
        }
    }
}

/// One immutable log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub actor: Actor,
    pub payload: String,
}

impl EventRecord {
    pub fn new(id: impl Into<String>, timestamp: i64, actor: Actor, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            actor,
            payload: payload.into(),
        }
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// ORDERING
// ============================================================================

/// Physical order of records in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogDirection {
    OldestFirst,
    NewestFirst,
}

impl LogDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogDirection::OldestFirst => "oldest-first",
            LogDirection::NewestFirst => "newest-first",
        }
    }
}

// ============================================================================
// EXTRACTION RESULT
// ============================================================================

/// Non-fatal condition reported alongside an extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LogSignal {
    /// Log missing, unreadable or empty - callers treat this as zero evidence
    LogUnavailable { reason: String },
}

/// Health of the extracted window, consumed by the confidence scorer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogQuality {
    /// Lines in the store that did not parse as records
    pub malformed_lines: usize,
    /// Records in the window with a zero (uninitialized) timestamp
    pub zero_timestamps: usize,
    /// Adjacent physical records that disagree with the verified direction
    pub ordering_inversions: usize,
    /// Window records whose payload looks like merge/conflict noise
    pub merge_noise_records: usize,
    /// Records in the window
    pub window_records: usize,
}

impl LogQuality {
    pub fn merge_noise_ratio(&self) -> f32 {
        if self.window_records == 0 {
            0.0
        } else {
            self.merge_noise_records as f32 / self.window_records as f32
        }
    }

    /// Store shows signs of an anomalous or uninitialized state
    pub fn is_anomalous(&self) -> bool {
        self.malformed_lines > 0 || self.zero_timestamps > 0 || self.ordering_inversions > 0
    }
}

/// Ordered window plus the signals gathered while extracting it
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Chronological (oldest first), independent of physical order
    pub events: Vec<EventRecord>,
    pub window_start: i64,
    pub window_end: i64,
    pub signal: Option<LogSignal>,
    pub quality: LogQuality,
}

impl Extraction {
    pub fn unavailable(window_start: i64, window_end: i64, reason: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            window_start,
            window_end,
            signal: Some(LogSignal::LogUnavailable {
                reason: reason.into(),
            }),
            quality: LogQuality::default(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.signal, Some(LogSignal::LogUnavailable { .. }))
    }
}
