//! Audit history (JSON Lines, one record per run)

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::types::{AuditReport, AuditRunRecord};
use crate::error::{EngineError, EngineResult};

pub struct AuditHistory {
    path: PathBuf,
}

impl AuditHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, report: &AuditReport) -> EngineResult<AuditRunRecord> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
            }
        }

        let record = AuditRunRecord::from(report);
        let line = serde_json::to_string(&record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::io(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| EngineError::io(&self.path, e))?;

        Ok(record)
    }

    /// Every readable record; unparsable lines are skipped
    pub fn load(&self) -> EngineResult<Vec<AuditRunRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(&self.path, e)),
        };

        let mut records = Vec::new();
        let mut skipped = 0;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| EngineError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRunRecord>(&line) {
                Ok(r) => records.push(r),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {} unreadable line(s) in {:?}", skipped, self.path);
        }
        Ok(records)
    }
}

/// Violation id -> number of independent sessions it appeared in.
///
/// Re-auditing a window, or auditing windows that overlap, does not add a
/// session: per violation, only a maximal set of pairwise disjoint windows
/// is counted.
pub fn independent_sessions<'a>(records: impl IntoIterator<Item = &'a AuditRunRecord>) -> BTreeMap<String, usize> {
    let mut windows: BTreeMap<&str, Vec<(i64, i64)>> = BTreeMap::new();
    for record in records {
        for (id, count) in &record.violation_counts {
            if *count > 0 {
                windows
                    .entry(id.as_str())
                    .or_default()
                    .push((record.window_start, record.window_end));
            }
        }
    }

    windows
        .into_iter()
        .map(|(id, mut spans)| {
            // Earliest-ending first gives the largest disjoint set
            spans.sort_by_key(|&(start, end)| (end, start));
            let mut sessions = 0;
            let mut last_end: Option<i64> = None;
            for (start, end) in spans {
                if last_end.map_or(true, |last| start > last) {
                    sessions += 1;
                    last_end = Some(end);
                }
            }
            (id.to_string(), sessions)
        })
        .collect()
}
