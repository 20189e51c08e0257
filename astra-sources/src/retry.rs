//! Bounded retry with exponential backoff
//!
//! The engine itself never retries. Integrations that want another attempt on
//! transient failures wrap an adapter in [`Retrying`] before registering it.

use async_trait::async_trait;
use astra_core::{SourceOutcome, Subject, SubjectKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::SourceAdapter;

/// How many extra attempts to make, and how long to wait between them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Backoff before retry number `attempt` (0-based), before jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Longest total sleep across all retries, jitter included
    pub fn max_total_backoff(&self) -> Duration {
        (0..self.retries)
            .map(|attempt| self.backoff(attempt))
            .fold(Duration::ZERO, |total, delay| total.saturating_add(delay + delay / 2))
    }

    /// Backoff plus up to 50% random jitter
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let spread = u64::try_from(base.as_millis()).unwrap_or(u64::MAX) / 2;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Wraps an adapter, retrying Timeout, Unreachable and RateLimited failures
pub struct Retrying<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: SourceAdapter> Retrying<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

#[async_trait]
impl<A: SourceAdapter> SourceAdapter for Retrying<A> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        self.inner.accepts(kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let mut attempt = 0;
        loop {
            let outcome = self.inner.fetch(subject).await;

            let transient = outcome
                .as_failure()
                .is_some_and(|failure| failure.kind.is_transient());
            if !transient || attempt >= self.policy.retries {
                return outcome;
            }

            let delay = self.policy.jittered_backoff(attempt);
            debug!(
                "{} attempt {} failed ({:?}), retrying in {:?}",
                self.inner.id(),
                attempt + 1,
                outcome.as_failure().map(|f| f.kind),
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl<T: SourceAdapter + ?Sized> SourceAdapter for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        (**self).accepts(kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        (**self).fetch(subject).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::{Failure, FailureKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `kind` until `failures` attempts have been made
    struct Flaky {
        kind: FailureKind,
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(kind: FailureKind, failures: u32) -> Self {
            Self {
                kind,
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for Flaky {
        fn id(&self) -> &str {
            "flaky"
        }

        fn accepts(&self, _kind: SubjectKind) -> bool {
            true
        }

        async fn fetch(&self, _subject: &Subject) -> SourceOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Failure::new(self.kind, "flaky").into()
            } else {
                SourceOutcome::Signals(vec![])
            }
        }
    }

    fn fast(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    fn subject() -> Subject {
        Subject::domain("example.com").unwrap()
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let adapter = Retrying::new(Flaky::new(FailureKind::Unreachable, 2), fast(2));
        let outcome = adapter.fetch(&subject()).await;
        assert!(!outcome.is_failure());
        assert_eq!(adapter.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let adapter = Retrying::new(Flaky::new(FailureKind::RateLimited, 10), fast(2));
        let outcome = adapter.fetch(&subject()).await;
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::RateLimited));
        assert_eq!(adapter.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_verified_absence() {
        let adapter = Retrying::new(Flaky::new(FailureKind::NotFound, 10), fast(5));
        let outcome = adapter.fetch(&subject()).await;
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::NotFound));
        assert_eq!(adapter.into_inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_arc_delegates() {
        let shared: Arc<dyn SourceAdapter> = Arc::new(Flaky::new(FailureKind::Timeout, 0));
        let adapter = Retrying::new(shared, fast(1));
        assert_eq!(adapter.id(), "flaky");
        assert!(!adapter.fetch(&subject()).await.is_failure());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(8), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));

        assert_eq!(RetryPolicy::default().max_total_backoff(), Duration::ZERO);
        let two = policy.with_retries(2);
        assert_eq!(two.max_total_backoff(), Duration::from_millis(450));

        let jittered = policy.jittered_backoff(1);
        assert!(jittered >= Duration::from_millis(200));
        assert!(jittered <= Duration::from_millis(300));
    }
}
