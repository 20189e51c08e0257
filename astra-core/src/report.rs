//! Subject reports handed back to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FailureKind, RiskReport, SourceProvenance, Subject, SubjectKind};

/// A source that did not contribute, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSource {
    pub source: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// Risk report plus request-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectReport {
    pub id: Uuid,
    pub subject: String,
    pub subject_kind: SubjectKind,
    pub generated_at: DateTime<Utc>,
    pub risk: RiskReport,
    pub failed_sources: Vec<FailedSource>,
    /// No source reported anything
    pub insufficient_data: bool,
}

impl SubjectReport {
    /// Package a risk report for `subject`
    pub fn assemble(subject: &Subject, risk: RiskReport) -> Self {
        let failed_sources = risk
            .evidence
            .failures()
            .map(|(source, failure)| FailedSource {
                source: source.to_string(),
                kind: failure.kind,
                detail: failure.detail.clone(),
            })
            .collect();

        let insufficient_data = risk.evidence.contributors().is_empty();

        Self {
            id: Uuid::new_v4(),
            subject: subject.identifier(),
            subject_kind: subject.kind(),
            generated_at: Utc::now(),
            risk,
            failed_sources,
            insufficient_data,
        }
    }

    pub fn provenance(&self) -> &[SourceProvenance] {
        &self.risk.evidence.provenance
    }

    /// One-line summary for logs and terminal output
    pub fn summary(&self) -> String {
        let sources = self.provenance().len();
        let contributed = self.risk.evidence.contributors().len();
        let mut line = format!(
            "{} {} risk {} ({}/100), {} signal(s) from {}/{} source(s)",
            self.subject_kind,
            self.subject,
            self.risk.level,
            self.risk.score,
            self.risk.evidence.signal_count(),
            contributed,
            sources,
        );
        if self.insufficient_data {
            line.push_str(", insufficient data");
        }
        line
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
