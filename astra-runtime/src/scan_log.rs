//! Bounded, most-recent-first history of finished investigations

use astra_core::{RiskLevel, SubjectKind, SubjectReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of entries kept
pub const DEFAULT_SCAN_LOG_CAPACITY: usize = 5;

/// Summary of one finished investigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub subject: String,
    pub subject_kind: SubjectKind,
    pub score: u8,
    pub level: RiskLevel,
    pub signals: usize,
    pub failed_sources: usize,
    pub scanned_at: DateTime<Utc>,
}

impl From<&SubjectReport> for ScanEntry {
    fn from(report: &SubjectReport) -> Self {
        Self {
            subject: report.subject.clone(),
            subject_kind: report.subject_kind,
            score: report.risk.score,
            level: report.risk.level,
            signals: report.risk.evidence.signal_count(),
            failed_sources: report.failed_sources.len(),
            scanned_at: report.generated_at,
        }
    }
}

/// Caller-owned scan history
///
/// Holds at most `capacity` entries; recording past that drops the oldest.
#[derive(Debug, Clone)]
pub struct ScanLog {
    entries: VecDeque<ScanEntry>,
    capacity: usize,
}

impl Default for ScanLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SCAN_LOG_CAPACITY)
    }
}

impl ScanLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A capacity of 0 is raised to 1
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a report and return its entry
    pub fn record(&mut self, report: &SubjectReport) -> &ScanEntry {
        self.entries.push_front(ScanEntry::from(report));
        self.entries.truncate(self.capacity);
        &self.entries[0]
    }

    /// Most recent first
    pub fn entries(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ScanEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
