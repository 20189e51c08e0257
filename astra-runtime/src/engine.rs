//! Investigation Engine
//!
//! Wires the orchestrator, merger and scorer together:
//! - Collect outcomes from every applicable source within the deadline
//! - Merge them into one evidence record
//! - Score the evidence and package a report
//!
//! An investigation never fails once the engine exists. Source failures end
//! up in the report's provenance instead.

use astra_core::{Merger, RiskScorer, ScoringPolicy, SourcePrecedence, Subject, SubjectReport};
use astra_sources::{build_adapters, SourceAdapter};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{AstraConfig, EngineConfig, EngineError, Orchestrator, OrchestratorConfig};

/// Runs investigations against a fixed adapter set
pub struct Engine {
    orchestrator: Orchestrator,
    merger: Merger,
    scorer: RiskScorer,
}

impl Engine {
    /// Create an engine from pre-built adapters
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: &EngineConfig,
        policy: ScoringPolicy,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        policy.validate()?;

        if config.source_timeout_ms > config.deadline_ms {
            warn!(
                "Per-source timeout ({}ms) exceeds the deadline ({}ms); the deadline wins",
                config.source_timeout_ms, config.deadline_ms
            );
        }

        Ok(Self {
            orchestrator: Orchestrator::new(
                adapters,
                OrchestratorConfig {
                    deadline: config.deadline(),
                    source_timeout: config.source_timeout(),
                },
            ),
            merger: Merger::new(SourcePrecedence::default()),
            scorer: RiskScorer::new(policy),
        })
    }

    /// Create an engine with the shipped adapters registered from `config`
    pub fn from_config(config: &AstraConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let adapters = build_adapters(
            &config.sources,
            config.engine.attempt_timeout(),
            config.engine.retry,
        )?;
        Self::new(adapters, &config.engine, config.scoring.clone())
    }

    /// Replace the precedence table used to pick single-valued winners
    pub fn with_precedence(mut self, precedence: SourcePrecedence) -> Self {
        self.merger = Merger::new(precedence);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn policy(&self) -> &ScoringPolicy {
        self.scorer.policy()
    }

    /// Investigate one subject
    pub async fn investigate(&self, subject: &Subject) -> SubjectReport {
        info!("Investigating {} {}", subject.kind(), subject);

        let results = self.orchestrator.collect(subject).await;
        let evidence = self
            .merger
            .merge(&subject.identifier(), Utc::now(), &results);

        debug!(
            "Merged {} signals from {} results ({} failed)",
            evidence.signal_count(),
            results.len(),
            evidence.failures().count()
        );

        let report = SubjectReport::assemble(subject, self.scorer.score(evidence));

        if report.insufficient_data {
            warn!("No source reported anything for {}", subject);
        }
        info!("{}", report.summary());

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::{
        ids, Failure, FailureKind, RiskFactor, RiskLevel, Signal, SignalPayload, SourceOutcome,
        SubjectKind, ThreatCategory, ThreatListHit,
    };
    use astra_sources::ExifAdapter;
    use async_trait::async_trait;

    struct Fixed {
        id: &'static str,
        outcome: SourceOutcome,
    }

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        fn accepts(&self, kind: SubjectKind) -> bool {
            kind == SubjectKind::Url
        }

        async fn fetch(&self, _subject: &Subject) -> SourceOutcome {
            self.outcome.clone()
        }
    }

    fn malware_hit() -> SourceOutcome {
        let hit = ThreatListHit {
            category: ThreatCategory::Malware,
            list: "urlhaus".to_string(),
            reference: None,
            detail: Some("malware_download".to_string()),
        };
        SourceOutcome::Signals(vec![Signal::builder(SignalPayload::ThreatListHit(hit))
            .source(ids::URLHAUS)
            .build()])
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            deadline_ms: 0,
            ..EngineConfig::default()
        };
        assert!(Engine::new(vec![], &config, ScoringPolicy::default()).is_err());
    }

    #[tokio::test]
    async fn test_malware_with_partial_failure() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(Fixed {
                id: ids::URLHAUS,
                outcome: malware_hit(),
            }),
            Arc::new(Fixed {
                id: ids::PHISHTANK,
                outcome: Failure::unreachable("connection refused").into(),
            }),
        ];
        let engine = Engine::new(
            adapters,
            &EngineConfig::default(),
            ScoringPolicy::default(),
        )
        .unwrap();

        let subject = Subject::url("http://bad.example/payload.exe").unwrap();
        let report = engine.investigate(&subject).await;

        assert_eq!(report.risk.level, RiskLevel::High);
        assert!(report.risk.score >= 95);
        assert_eq!(report.risk.factors, vec![RiskFactor::MalwareListed]);
        assert!(!report.insufficient_data);
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(report.failed_sources[0].kind, FailureKind::Unreachable);
    }

    #[tokio::test]
    async fn test_no_applicable_sources() {
        let engine =
            Engine::new(vec![], &EngineConfig::default(), ScoringPolicy::default()).unwrap();
        let subject = Subject::domain("example.com").unwrap();
        let report = engine.investigate(&subject).await;

        assert_eq!(report.risk.score, 0);
        assert_eq!(report.risk.level, RiskLevel::Low);
        assert!(report.insufficient_data);
        assert!(report.provenance().is_empty());
    }

    #[tokio::test]
    async fn test_image_metadata_end_to_end() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(ExifAdapter::new())];
        let engine = Engine::new(
            adapters,
            &EngineConfig::default(),
            ScoringPolicy::default(),
        )
        .unwrap();

        let bundle = astra_core::ExifBundle {
            camera_make: Some("Canon".to_string()),
            camera_model: Some("EOS R5".to_string()),
            gps_latitude: Some(48.8584),
            gps_longitude: Some(2.2945),
            ..astra_core::ExifBundle::default()
        };
        let report = engine.investigate(&Subject::image_metadata(bundle)).await;

        assert_eq!(report.risk.score, 65);
        assert_eq!(report.risk.level, RiskLevel::High);
        assert_eq!(
            report.risk.factors,
            vec![RiskFactor::GpsLocation, RiskFactor::CameraFingerprint]
        );
    }
}
