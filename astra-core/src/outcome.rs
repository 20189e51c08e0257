//! Per-source outcomes
//!
//! Every adapter invocation ends in exactly one [`SourceOutcome`]. Failures are
//! values, never raised errors, so one broken provider cannot take the request
//! down with it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Signal;

/// Why a source did not contribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Unreachable,
    RateLimited,
    Malformed,
    NotFound,
}

impl FailureKind {
    /// `NotFound` means the source answered and has nothing on the subject
    /// ("verified clean"); every other kind means it could not verify
    pub fn is_verified_absence(self) -> bool {
        matches!(self, FailureKind::NotFound)
    }

    /// Transient failures worth another attempt
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::Unreachable | FailureKind::RateLimited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Unreachable => "unreachable",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Malformed => "malformed",
            FailureKind::NotFound => "not_found",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure with a human-readable reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Unreachable, detail)
    }

    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Malformed, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, detail)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// What one adapter invocation produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Signals(Vec<Signal>),
    Failure(Failure),
}

impl SourceOutcome {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        SourceOutcome::Failure(Failure::new(kind, detail))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SourceOutcome::Failure(_))
    }

    pub fn signals(&self) -> &[Signal] {
        match self {
            SourceOutcome::Signals(signals) => signals,
            SourceOutcome::Failure(_) => &[],
        }
    }

    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            SourceOutcome::Failure(failure) => Some(failure),
            SourceOutcome::Signals(_) => None,
        }
    }
}

impl From<Failure> for SourceOutcome {
    fn from(failure: Failure) -> Self {
        SourceOutcome::Failure(failure)
    }
}

/// An outcome tagged with the source that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: String,
    pub outcome: SourceOutcome,
    /// Wall time spent waiting on the source
    pub elapsed_ms: u64,
}

impl SourceResult {
    pub fn new(source: impl Into<String>, outcome: SourceOutcome, elapsed_ms: u64) -> Self {
        Self {
            source: source.into(),
            outcome,
            elapsed_ms,
        }
    }
}
