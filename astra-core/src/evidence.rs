//! Evidence merging
//!
//! Reduces the per-source outcomes of one request into a single
//! [`MergedEvidence`]:
//! - Results are put in canonical order first, so completion order never matters
//! - Single-valued kinds keep one winner (confidence, then source precedence)
//! - Multi-valued kinds keep every distinct payload
//! - Identical payloads from several sources reinforce one item as corroboration
//! - Threat flags are OR-ed across all sources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::{
    Failure, Signal, SignalKind, SignalPayload, SourceOutcome, SourcePrecedence, SourceResult,
    ThreatCategory,
};

/// One surviving signal plus the other sources that reported the same payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub signal: Signal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corroborated_by: Vec<String>,
}

impl EvidenceItem {
    fn new(signal: Signal) -> Self {
        Self {
            signal,
            corroborated_by: Vec::new(),
        }
    }

    fn corroborate(&mut self, source: &str) {
        if self.signal.source != source && !self.corroborated_by.iter().any(|s| s == source) {
            self.corroborated_by.push(source.to_string());
        }
    }
}

/// Boolean facts, asserted when any single source reports them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatFlags {
    pub malware_detected: bool,
    pub phishing_detected: bool,
    pub breached: bool,
    pub location_exposed: bool,
}

impl ThreatFlags {
    fn observe(&mut self, payload: &SignalPayload) {
        match payload {
            SignalPayload::ThreatListHit(hit) => match hit.category {
                ThreatCategory::Malware => self.malware_detected = true,
                ThreatCategory::Phishing => self.phishing_detected = true,
            },
            SignalPayload::BreachRecord(_) => self.breached = true,
            SignalPayload::ExifGps(_) => self.location_exposed = true,
            _ => {}
        }
    }
}

/// What a source did for this request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvenanceStatus {
    /// Number of signals the source reported (before deduplication)
    Contributed { signals: usize },
    Failed(Failure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProvenance {
    pub source: String,
    #[serde(flatten)]
    pub status: ProvenanceStatus,
    pub elapsed_ms: u64,
}

impl SourceProvenance {
    pub fn failure(&self) -> Option<&Failure> {
        match &self.status {
            ProvenanceStatus::Failed(failure) => Some(failure),
            ProvenanceStatus::Contributed { .. } => None,
        }
    }

    pub fn contributed(&self) -> bool {
        matches!(self.status, ProvenanceStatus::Contributed { signals } if signals > 0)
    }
}

/// The deduplicated signal set for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEvidence {
    /// Subject identifier
    pub subject: String,

    /// Reference instant for time-relative scoring rules
    pub collected_at: DateTime<Utc>,

    /// Surviving signals, grouped by kind
    pub items: BTreeMap<SignalKind, Vec<EvidenceItem>>,

    /// Per-source bookkeeping, sorted by source id
    pub provenance: Vec<SourceProvenance>,

    pub flags: ThreatFlags,
}

impl MergedEvidence {
    /// Evidence with no sources at all
    pub fn empty(subject: impl Into<String>, collected_at: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            collected_at,
            items: BTreeMap::new(),
            provenance: Vec::new(),
            flags: ThreatFlags::default(),
        }
    }

    pub fn items(&self, kind: SignalKind) -> &[EvidenceItem] {
        self.items.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn signals(&self, kind: SignalKind) -> impl Iterator<Item = &Signal> {
        self.items(kind).iter().map(|item| &item.signal)
    }

    /// The winning signal of a single-valued kind
    pub fn single(&self, kind: SignalKind) -> Option<&Signal> {
        self.items(kind).first().map(|item| &item.signal)
    }

    pub fn has(&self, kind: SignalKind) -> bool {
        !self.items(kind).is_empty()
    }

    pub fn signal_count(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.signal_count() == 0
    }

    /// Sources that reported at least one signal
    pub fn contributors(&self) -> Vec<&str> {
        self.provenance
            .iter()
            .filter(|p| p.contributed())
            .map(|p| p.source.as_str())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Failure)> {
        self.provenance
            .iter()
            .filter_map(|p| p.failure().map(|f| (p.source.as_str(), f)))
    }

    pub fn malware_detected(&self) -> bool {
        self.flags.malware_detected
    }
}

/// Folds source results into evidence using a fixed precedence table
#[derive(Debug, Clone, Default)]
pub struct Merger {
    precedence: SourcePrecedence,
}

impl Merger {
    pub fn new(precedence: SourcePrecedence) -> Self {
        Self { precedence }
    }

    pub fn precedence(&self) -> &SourcePrecedence {
        &self.precedence
    }

    /// Merge one request's results
    pub fn merge(
        &self,
        subject: &str,
        collected_at: DateTime<Utc>,
        results: &[SourceResult],
    ) -> MergedEvidence {
        let mut ordered: Vec<&SourceResult> = results.iter().collect();
        ordered.sort_by(|a, b| {
            self.precedence
                .general_rank(&a.source)
                .cmp(&self.precedence.general_rank(&b.source))
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.elapsed_ms.cmp(&b.elapsed_ms))
        });

        let mut provenance = Vec::with_capacity(ordered.len());
        let mut grouped: BTreeMap<SignalKind, Vec<Signal>> = BTreeMap::new();
        let mut flags = ThreatFlags::default();

        for result in &ordered {
            let status = match &result.outcome {
                SourceOutcome::Signals(signals) => {
                    for signal in signals {
                        // The result's source is the identity the orchestrator ran
                        let mut signal = signal.clone();
                        signal.source = result.source.clone();
                        flags.observe(&signal.payload);
                        grouped.entry(signal.kind()).or_default().push(signal);
                    }
                    ProvenanceStatus::Contributed {
                        signals: signals.len(),
                    }
                }
                SourceOutcome::Failure(failure) => ProvenanceStatus::Failed(failure.clone()),
            };
            provenance.push(SourceProvenance {
                source: result.source.clone(),
                status,
                elapsed_ms: result.elapsed_ms,
            });
        }
        provenance.sort_by(|a, b| a.source.cmp(&b.source));

        let items = grouped
            .into_iter()
            .map(|(kind, mut candidates)| {
                candidates.sort_by(|a, b| self.candidate_order(kind, a, b));
                let merged = if kind.is_single_valued() {
                    self.pick_single(kind, candidates)
                } else {
                    Self::dedupe(candidates)
                };
                (kind, merged)
            })
            .collect();

        MergedEvidence {
            subject: subject.to_string(),
            collected_at,
            items,
            provenance,
            flags,
        }
    }

    /// Precedence, then source id, then payload, then confidence
    fn candidate_order(&self, kind: SignalKind, a: &Signal, b: &Signal) -> Ordering {
        self.precedence
            .rank(kind, &a.source)
            .cmp(&self.precedence.rank(kind, &b.source))
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    }

    fn pick_single(&self, kind: SignalKind, candidates: Vec<Signal>) -> Vec<EvidenceItem> {
        let winner = candidates.iter().min_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| self.candidate_order(kind, a, b))
        });

        let Some(winner) = winner else {
            return Vec::new();
        };

        let mut item = EvidenceItem::new(winner.clone());
        for loser in &candidates {
            if loser.fingerprint == winner.fingerprint {
                item.corroborate(&loser.source);
            }
        }
        vec![item]
    }

    fn dedupe(candidates: Vec<Signal>) -> Vec<EvidenceItem> {
        let mut items: Vec<EvidenceItem> = Vec::new();
        for signal in candidates {
            match items
                .iter_mut()
                .find(|item| item.signal.fingerprint == signal.fingerprint)
            {
                Some(existing) => existing.corroborate(&signal.source),
                None => items.push(EvidenceItem::new(signal)),
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ids, BreachRecord, BreachSeverity, DnsAnswer, GpsFix, ThreatListHit, WhoisRecord};
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn whois(registrar: &str) -> SignalPayload {
        SignalPayload::WhoisRecord(WhoisRecord {
            registrar: Some(registrar.to_string()),
            created: None,
            expires: None,
            nameservers: vec![],
            registrant_country: None,
        })
    }

    fn dns(value: &str) -> SignalPayload {
        SignalPayload::DnsRecord(DnsAnswer {
            record_type: "A".to_string(),
            value: value.to_string(),
            ttl: 60,
        })
    }

    fn signals(source: &str, payloads: Vec<SignalPayload>) -> SourceResult {
        let signals = payloads
            .into_iter()
            .map(|p| Signal::builder(p).source(source).build())
            .collect();
        SourceResult::new(source, SourceOutcome::Signals(signals), 10)
    }

    fn failed(source: &str, failure: Failure) -> SourceResult {
        SourceResult::new(source, SourceOutcome::Failure(failure), 10)
    }

    #[test]
    fn test_disagreeing_whois_keeps_authoritative_value() {
        let results = vec![
            signals(ids::WHOISJSONAPI, vec![whois("NameCheap, Inc.")]),
            signals(ids::RDAP, vec![whois("MarkMonitor Inc.")]),
        ];

        let evidence = Merger::default().merge("example.com", at(), &results);
        let items = evidence.items(SignalKind::WhoisRecord);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].signal.source, ids::RDAP);
        assert_eq!(items[0].signal.payload, whois("MarkMonitor Inc."));
        assert!(items[0].corroborated_by.is_empty());
    }

    #[test]
    fn test_higher_confidence_beats_precedence() {
        let confident = Signal::builder(whois("Gandi SAS"))
            .source(ids::WHOISJSONAPI)
            .build();
        let hesitant = Signal::builder(whois("OVH"))
            .source(ids::RDAP)
            .confidence(0.5)
            .build();
        let results = vec![
            SourceResult::new(ids::RDAP, SourceOutcome::Signals(vec![hesitant]), 5),
            SourceResult::new(ids::WHOISJSONAPI, SourceOutcome::Signals(vec![confident]), 5),
        ];

        let evidence = Merger::default().merge("example.com", at(), &results);
        let winner = evidence.single(SignalKind::WhoisRecord).unwrap();
        assert_eq!(winner.source, ids::WHOISJSONAPI);
    }

    #[test]
    fn test_identical_single_value_is_corroboration() {
        let results = vec![
            signals(ids::RDAP, vec![whois("MarkMonitor Inc.")]),
            signals(ids::WHOISJSONAPI, vec![whois("MarkMonitor Inc.")]),
        ];

        let evidence = Merger::default().merge("example.com", at(), &results);
        let items = evidence.items(SignalKind::WhoisRecord);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].corroborated_by, vec![ids::WHOISJSONAPI.to_string()]);
    }

    #[test]
    fn test_multi_valued_dedup_keeps_distinct() {
        let results = vec![
            signals("resolver-b", vec![dns("1.1.1.1"), dns("8.8.8.8")]),
            signals(ids::GOOGLE_DNS, vec![dns("1.1.1.1")]),
        ];

        let evidence = Merger::default().merge("example.com", at(), &results);
        let items = evidence.items(SignalKind::DnsRecord);

        assert_eq!(items.len(), 2);
        let shared = items
            .iter()
            .find(|i| i.signal.payload == dns("1.1.1.1"))
            .unwrap();
        assert_eq!(shared.signal.source, ids::GOOGLE_DNS);
        assert_eq!(shared.corroborated_by, vec!["resolver-b".to_string()]);
    }

    #[test]
    fn test_single_malware_hit_sets_flag() {
        let hit = SignalPayload::ThreatListHit(ThreatListHit {
            category: ThreatCategory::Malware,
            list: "URLhaus".to_string(),
            reference: None,
            detail: Some("malware_download".to_string()),
        });
        let results = vec![
            signals(ids::URLHAUS, vec![hit]),
            failed(ids::PHISHTANK, Failure::not_found("not in database")),
            failed(ids::ABUSEIPDB, Failure::timeout("5000ms elapsed")),
        ];

        let evidence = Merger::default().merge("evil.test/x", at(), &results);
        assert!(evidence.malware_detected());
        assert!(!evidence.flags.phishing_detected);
        assert_eq!(evidence.contributors(), vec![ids::URLHAUS]);
        assert_eq!(evidence.failures().count(), 2);
    }

    #[test]
    fn test_flags_from_breach_and_gps() {
        let breach = SignalPayload::BreachRecord(BreachRecord {
            name: "Adobe".to_string(),
            title: None,
            breach_date: None,
            data_classes: vec!["Passwords".to_string()],
            is_verified: true,
            severity: BreachSeverity::High,
        });
        let gps = SignalPayload::ExifGps(GpsFix {
            latitude: 1.0,
            longitude: 2.0,
            altitude: None,
        });
        let results = vec![signals(ids::HIBP_BREACHES, vec![breach]), signals(ids::EXIF, vec![gps])];

        let evidence = Merger::default().merge("x", at(), &results);
        assert!(evidence.flags.breached);
        assert!(evidence.flags.location_exposed);
    }

    #[test]
    fn test_merge_is_order_independent_and_repeatable() {
        let results = vec![
            signals(ids::WHOISJSONAPI, vec![whois("A"), dns("10.0.0.1")]),
            signals(ids::RDAP, vec![whois("B")]),
            signals(ids::GOOGLE_DNS, vec![dns("10.0.0.2"), dns("10.0.0.1")]),
            failed(ids::CRTSH, Failure::unreachable("503")),
        ];
        let mut reversed = results.clone();
        reversed.reverse();

        let merger = Merger::default();
        let first = merger.merge("example.com", at(), &results);
        let second = merger.merge("example.com", at(), &results);
        let permuted = merger.merge("example.com", at(), &reversed);

        assert_eq!(first, second);
        assert_eq!(first, permuted);
    }

    #[test]
    fn test_no_results_is_empty_evidence() {
        let evidence = Merger::default().merge("example.com", at(), &[]);
        assert!(evidence.is_empty());
        assert!(evidence.contributors().is_empty());
        assert_eq!(evidence, MergedEvidence::empty("example.com", at()));
    }
}
