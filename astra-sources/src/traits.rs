//! Common traits for source adapters

use async_trait::async_trait;
use astra_core::{Failure, SourceOutcome, Subject, SubjectKind};
use tracing::warn;

/// One external provider, translated into signals or a typed failure
///
/// `fetch` must not panic and must not block indefinitely: transport errors,
/// bad statuses and unexpected bodies all come back as
/// [`SourceOutcome::Failure`]. Adapters never retry on their own.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique adapter identifier
    fn id(&self) -> &str;

    /// Whether this adapter can say anything about `kind`
    fn accepts(&self, kind: SubjectKind) -> bool;

    /// Look the subject up
    async fn fetch(&self, subject: &Subject) -> SourceOutcome;
}

/// Outcome for an adapter invoked with a subject it never declared
///
/// Trips in debug builds; degrades to `Malformed` in release builds.
pub fn unsupported(adapter: &str, subject: &Subject) -> SourceOutcome {
    debug_assert!(
        false,
        "adapter {} invoked for unsupported subject kind {}",
        adapter,
        subject.kind()
    );
    warn!("{} does not support {} subjects", adapter, subject.kind());
    Failure::malformed(format!("{} subjects are not supported", subject.kind())).into()
}

/// Subject kinds an adapter accepts, in declaration order
pub fn accepted_kinds(adapter: &dyn SourceAdapter) -> Vec<SubjectKind> {
    SubjectKind::ALL
        .into_iter()
        .filter(|&kind| adapter.accepts(kind))
        .collect()
}
