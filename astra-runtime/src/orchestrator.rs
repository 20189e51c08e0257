//! Concurrent fan-out over source adapters
//!
//! One task per applicable adapter. Each task races the per-source timeout;
//! the join loop races the overall deadline. Anything still running at the
//! deadline is aborted and reported as a timeout, so a hung provider can
//! never hold the request hostage.

use astra_core::{Failure, SourceOutcome, SourceResult, Subject, SubjectKind};
use astra_sources::SourceAdapter;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Timing bounds for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub deadline: Duration,
    pub source_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(8),
            source_timeout: Duration::from_secs(5),
        }
    }
}

/// Invokes applicable adapters concurrently and collects their outcomes
pub struct Orchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: OrchestratorConfig) -> Self {
        Self { adapters, config }
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
    }

    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Adapters that accept `kind`, in registration order
    pub fn applicable(&self, kind: SubjectKind) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters
            .iter()
            .filter(|adapter| adapter.accepts(kind))
            .cloned()
            .collect()
    }

    /// Run every applicable adapter against `subject`
    ///
    /// Returns exactly one result per applicable adapter, in registration
    /// order, whatever order they completed in. Never fails.
    pub async fn collect(&self, subject: &Subject) -> Vec<SourceResult> {
        let applicable = self.applicable(subject.kind());
        if applicable.is_empty() {
            warn!("No adapters accept {} subjects", subject.kind());
            return Vec::new();
        }

        debug!("Dispatching {} to {} adapters", subject, applicable.len());

        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.deadline;
        let subject = Arc::new(subject.clone());
        let source_timeout = self.config.source_timeout;

        let mut tasks = JoinSet::new();
        for (idx, adapter) in applicable.iter().cloned().enumerate() {
            let subject = Arc::clone(&subject);
            tasks.spawn(async move {
                let task_started = Instant::now();
                let outcome = run_adapter(adapter.as_ref(), &subject, source_timeout).await;
                (idx, outcome, task_started.elapsed())
            });
        }

        let mut slots: Vec<Option<SourceResult>> = vec![None; applicable.len()];
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((idx, outcome, elapsed)))) => {
                    let source = applicable[idx].id();
                    match &outcome {
                        SourceOutcome::Signals(signals) => {
                            debug!("{} returned {} signals in {:?}", source, signals.len(), elapsed)
                        }
                        SourceOutcome::Failure(failure) => {
                            debug!("{} failed in {:?}: {}", source, elapsed, failure)
                        }
                    }
                    slots[idx] = Some(SourceResult::new(source, outcome, millis(elapsed)));
                }
                Ok(Some(Err(e))) => {
                    // Panics are caught inside the task; only cancellation lands here
                    warn!("Adapter task did not complete: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Deadline of {:?} reached with {} adapters pending",
                        self.config.deadline,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let waited = millis(started.elapsed());
        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    SourceResult::new(
                        applicable[idx].id(),
                        Failure::timeout(format!(
                            "still pending at the {}ms deadline",
                            self.config.deadline.as_millis()
                        ))
                        .into(),
                        waited,
                    )
                })
            })
            .collect()
    }
}

/// One adapter call bounded by its own timeout, with panics turned into failures
async fn run_adapter(
    adapter: &dyn SourceAdapter,
    subject: &Subject,
    timeout: Duration,
) -> SourceOutcome {
    let call = AssertUnwindSafe(adapter.fetch(subject)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(panic)) => {
            let message = panic_message(&*panic);
            warn!("{} panicked: {}", adapter.id(), message);
            Failure::malformed(format!("adapter panicked: {}", message)).into()
        }
        Err(_) => Failure::timeout(format!("no response within {}ms", timeout.as_millis())).into(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::{DnsAnswer, FailureKind, Signal, SignalPayload};
    use astra_sources::{RetryPolicy, Retrying};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Answer(Duration),
        Hang,
        Panic,
        Fail(FailureKind),
        /// First call times out after the delay, later calls answer
        TimeoutOnce(Duration),
    }

    struct Stub {
        id: &'static str,
        accepts: SubjectKind,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl Stub {
        fn with_kind(id: &'static str, accepts: SubjectKind) -> Arc<Self> {
            Arc::new(Self {
                id,
                accepts,
                behavior: Behavior::Answer(Duration::from_millis(1)),
                calls: AtomicUsize::new(0),
            })
        }

        fn new(id: &'static str, behavior: Behavior) -> Arc<dyn SourceAdapter> {
            Arc::new(Self {
                id,
                accepts: SubjectKind::Domain,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for Stub {
        fn id(&self) -> &str {
            self.id
        }

        fn accepts(&self, kind: SubjectKind) -> bool {
            kind == self.accepts
        }

        async fn fetch(&self, _subject: &Subject) -> SourceOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Answer(delay) => {
                    tokio::time::sleep(*delay).await;
                    let signal = Signal::builder(SignalPayload::DnsRecord(DnsAnswer {
                        record_type: "A".to_string(),
                        value: self.id.to_string(),
                        ttl: 1,
                    }))
                    .source(self.id)
                    .build();
                    SourceOutcome::Signals(vec![signal])
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    SourceOutcome::Signals(vec![])
                }
                Behavior::Panic => panic!("provider returned nonsense"),
                Behavior::Fail(kind) => Failure::new(*kind, "stub failure").into(),
                Behavior::TimeoutOnce(delay) if call == 0 => {
                    tokio::time::sleep(*delay).await;
                    Failure::timeout("request timed out").into()
                }
                Behavior::TimeoutOnce(_) => SourceOutcome::Signals(vec![]),
            }
        }
    }

    fn orchestrator(adapters: Vec<Arc<dyn SourceAdapter>>, deadline_ms: u64, source_ms: u64) -> Orchestrator {
        Orchestrator::new(
            adapters,
            OrchestratorConfig {
                deadline: Duration::from_millis(deadline_ms),
                source_timeout: Duration::from_millis(source_ms),
            },
        )
    }

    fn subject() -> Subject {
        Subject::domain("example.com").unwrap()
    }

    fn kinds(results: &[SourceResult]) -> Vec<(String, Option<FailureKind>)> {
        results
            .iter()
            .map(|r| (r.source.clone(), r.outcome.as_failure().map(|f| f.kind)))
            .collect()
    }

    #[tokio::test]
    async fn test_results_follow_registration_order() {
        let results = orchestrator(
            vec![
                Stub::new("slow", Behavior::Answer(Duration::from_millis(80))),
                Stub::new("fast", Behavior::Answer(Duration::from_millis(1))),
                Stub::new("broken", Behavior::Fail(FailureKind::RateLimited)),
            ],
            2_000,
            1_000,
        )
        .collect(&subject())
        .await;

        assert_eq!(
            kinds(&results),
            vec![
                ("slow".to_string(), None),
                ("fast".to_string(), None),
                ("broken".to_string(), Some(FailureKind::RateLimited)),
            ]
        );
    }

    #[tokio::test]
    async fn test_per_source_timeout() {
        let results = orchestrator(
            vec![
                Stub::new("hung", Behavior::Hang),
                Stub::new("fast", Behavior::Answer(Duration::from_millis(1))),
            ],
            5_000,
            100,
        )
        .collect(&subject())
        .await;

        assert_eq!(results[0].outcome.as_failure().map(|f| f.kind), Some(FailureKind::Timeout));
        assert!(!results[1].outcome.is_failure());
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_retried_within_source_budget() {
        let flaky = Arc::new(Stub {
            id: "flaky",
            accepts: SubjectKind::Domain,
            behavior: Behavior::TimeoutOnce(Duration::from_millis(100)),
            calls: AtomicUsize::new(0),
        });
        let policy = RetryPolicy {
            retries: 1,
            base_delay_ms: 10,
            max_delay_ms: 20,
        };
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(Retrying::new(flaky.clone(), policy))];

        let results = orchestrator(adapters, 2_000, 1_000).collect(&subject()).await;

        assert_eq!(kinds(&results), vec![("flaky".to_string(), None)]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overall_deadline_bounds_request() {
        let started = Instant::now();
        let results = orchestrator(
            vec![
                Stub::new("hung", Behavior::Hang),
                Stub::new("fast", Behavior::Answer(Duration::from_millis(1))),
            ],
            200,
            60_000,
        )
        .collect(&subject())
        .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            kinds(&results),
            vec![
                ("hung".to_string(), Some(FailureKind::Timeout)),
                ("fast".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_adapter_is_malformed() {
        let results = orchestrator(
            vec![
                Stub::new("panics", Behavior::Panic),
                Stub::new("fast", Behavior::Answer(Duration::from_millis(1))),
            ],
            2_000,
            1_000,
        )
        .collect(&subject())
        .await;

        let failure = results[0].outcome.as_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Malformed);
        assert!(failure.detail.contains("provider returned nonsense"));
        assert!(!results[1].outcome.is_failure());
    }

    #[tokio::test]
    async fn test_only_applicable_adapters_run() {
        let domain_stub = Stub::with_kind("domain", SubjectKind::Domain);
        let email_stub = Stub::with_kind("email", SubjectKind::Email);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![domain_stub.clone(), email_stub.clone()];

        let results = orchestrator(adapters, 1_000, 1_000).collect(&subject()).await;

        assert_eq!(results.len(), 1);
        assert_eq!(domain_stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(email_stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_applicable_adapters() {
        let results = orchestrator(vec![], 1_000, 1_000).collect(&subject()).await;
        assert!(results.is_empty());
    }
}
