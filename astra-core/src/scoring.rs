//! Composite risk scoring
//!
//! A pure function of the merged evidence and a policy table. No I/O, no
//! clock reads: time-relative rules measure against `evidence.collected_at`.
//!
//! Score = max(sum of triggered weights, highest triggered floor), clamped
//! to 100. Recommendations follow the fixed severity order of [`RiskFactor`].

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::{MergedEvidence, SignalKind, SignalPayload, MAX_SCORE};

/// Recommendation emitted when nothing triggered
pub const NO_SIGNIFICANT_RISK: &str = "no significant risk signals detected";

/// Scoring rules, declared in severity order (most severe first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    MalwareListed,
    PhishingListed,
    DataBreach,
    GpsLocation,
    AbuseReports,
    PasteExposure,
    NewlyRegisteredDomain,
    CameraFingerprint,
    EditedImage,
    ExpiredDomain,
    CaptureTimestamp,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 11] = [
        RiskFactor::MalwareListed,
        RiskFactor::PhishingListed,
        RiskFactor::DataBreach,
        RiskFactor::GpsLocation,
        RiskFactor::AbuseReports,
        RiskFactor::PasteExposure,
        RiskFactor::NewlyRegisteredDomain,
        RiskFactor::CameraFingerprint,
        RiskFactor::EditedImage,
        RiskFactor::ExpiredDomain,
        RiskFactor::CaptureTimestamp,
    ];

    /// Built-in weight, floor and recommendation
    pub fn default_policy(self) -> FactorPolicy {
        let (weight, floor, recommendation) = match self {
            RiskFactor::MalwareListed => (
                50,
                Some(95),
                "Listed as a malware distribution site - do not visit or download from it",
            ),
            RiskFactor::PhishingListed => (
                50,
                Some(90),
                "Listed as a known phishing site - never enter credentials on it",
            ),
            RiskFactor::DataBreach => (
                20,
                Some(70),
                "Found in known data breaches - change affected passwords and enable two-factor authentication",
            ),
            RiskFactor::GpsLocation => (
                50,
                None,
                "GPS coordinates embedded - removes your location privacy",
            ),
            RiskFactor::AbuseReports => (
                35,
                None,
                "Host has a poor abuse reputation - treat traffic from it with caution",
            ),
            RiskFactor::PasteExposure => (
                25,
                None,
                "Exposed in public pastes - watch for phishing and credential stuffing",
            ),
            RiskFactor::NewlyRegisteredDomain => (
                20,
                None,
                "Domain was registered recently - new domains are common in phishing campaigns",
            ),
            RiskFactor::CameraFingerprint => (
                15,
                None,
                "Camera model identified - can link to specific device",
            ),
            RiskFactor::EditedImage => (
                15,
                None,
                "Image has been edited - metadata may not be consistent",
            ),
            RiskFactor::ExpiredDomain => (
                10,
                None,
                "Domain registration has expired - it can be re-registered by anyone",
            ),
            RiskFactor::CaptureTimestamp => (
                5,
                None,
                "Timestamp embedded - reveals when photo was taken",
            ),
        };

        FactorPolicy {
            weight,
            floor,
            recommendation: recommendation.to_string(),
        }
    }
}

impl RiskFactor {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|factor| factor.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskFactor::MalwareListed => "malware_listed",
            RiskFactor::PhishingListed => "phishing_listed",
            RiskFactor::DataBreach => "data_breach",
            RiskFactor::GpsLocation => "gps_location",
            RiskFactor::AbuseReports => "abuse_reports",
            RiskFactor::PasteExposure => "paste_exposure",
            RiskFactor::NewlyRegisteredDomain => "newly_registered_domain",
            RiskFactor::CameraFingerprint => "camera_fingerprint",
            RiskFactor::EditedImage => "edited_image",
            RiskFactor::ExpiredDomain => "expired_domain",
            RiskFactor::CaptureTimestamp => "capture_timestamp",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-level risk category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Weight, optional floor and recommendation for one factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorPolicy {
    pub weight: u32,
    /// Minimum total score once this factor triggers
    #[serde(default)]
    pub floor: Option<u8>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("high threshold ({high}) must not be below medium threshold ({medium})")]
    ThresholdOrder { medium: u8, high: u8 },

    #[error("threshold {0} is above the maximum score")]
    ThresholdRange(u8),

    #[error("recent registration window of {0} days is outside 0..={max}", max = MAX_REGISTRATION_WINDOW_DAYS)]
    RegistrationWindow(i64),
}

/// Longest accepted newly-registered window, about a century
pub const MAX_REGISTRATION_WINDOW_DAYS: i64 = 36_500;

/// The policy table: factor rules plus level thresholds
///
/// Factors missing from `factors` fall back to their built-in policy, so a
/// config file only has to list the rules it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    #[serde(serialize_with = "factors_by_name", deserialize_with = "factors_from_names")]
    pub factors: BTreeMap<RiskFactor, FactorPolicy>,

    /// Scores strictly above this are HIGH
    pub high_above: u8,

    /// Scores strictly above this (and not HIGH) are MEDIUM
    pub medium_above: u8,

    /// Reputation confidence at or above which abuse reports count
    pub abuse_threshold: u8,

    /// A domain younger than this many days counts as newly registered
    pub recent_registration_days: i64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            factors: BTreeMap::new(),
            high_above: 60,
            medium_above: 30,
            abuse_threshold: 50,
            recent_registration_days: 30,
        }
    }
}

impl ScoringPolicy {
    pub fn factor(&self, factor: RiskFactor) -> FactorPolicy {
        self.factors
            .get(&factor)
            .cloned()
            .unwrap_or_else(|| factor.default_policy())
    }

    pub fn with_factor(mut self, factor: RiskFactor, policy: FactorPolicy) -> Self {
        self.factors.insert(factor, policy);
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for threshold in [self.medium_above, self.high_above] {
            if threshold > MAX_SCORE {
                return Err(PolicyError::ThresholdRange(threshold));
            }
        }
        if self.high_above < self.medium_above {
            return Err(PolicyError::ThresholdOrder {
                medium: self.medium_above,
                high: self.high_above,
            });
        }
        if !(0..=MAX_REGISTRATION_WINDOW_DAYS).contains(&self.recent_registration_days) {
            return Err(PolicyError::RegistrationWindow(self.recent_registration_days));
        }
        Ok(())
    }

    pub fn level_for(&self, score: u8) -> RiskLevel {
        if score > self.high_above {
            RiskLevel::High
        } else if score > self.medium_above {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Factor tables are keyed by name so any format with string keys can carry them
fn factors_by_name<S>(
    factors: &BTreeMap<RiskFactor, FactorPolicy>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(factors.iter().map(|(factor, policy)| (factor.as_str(), policy)))
}

fn factors_from_names<'de, D>(deserializer: D) -> Result<BTreeMap<RiskFactor, FactorPolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    let named = BTreeMap::<String, FactorPolicy>::deserialize(deserializer)?;
    named
        .into_iter()
        .map(|(name, policy)| {
            RiskFactor::from_name(&name)
                .map(|factor| (factor, policy))
                .ok_or_else(|| serde::de::Error::custom(format!("unknown risk factor {}", name)))
        })
        .collect()
}

/// Final score, category and recommendations for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// 0 - 100
    pub score: u8,
    pub level: RiskLevel,
    /// Severity-first, one per triggered factor
    pub recommendations: Vec<String>,
    /// Triggered factors, same order as `recommendations`
    pub factors: Vec<RiskFactor>,
    pub evidence: MergedEvidence,
}

/// Applies a [`ScoringPolicy`] to merged evidence
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    policy: ScoringPolicy,
}

impl RiskScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Factors triggered by the evidence, in severity order
    pub fn triggered(&self, evidence: &MergedEvidence) -> Vec<RiskFactor> {
        RiskFactor::ALL
            .into_iter()
            .filter(|&factor| self.is_triggered(factor, evidence))
            .collect()
    }

    fn is_triggered(&self, factor: RiskFactor, evidence: &MergedEvidence) -> bool {
        match factor {
            RiskFactor::MalwareListed => evidence.flags.malware_detected,
            RiskFactor::PhishingListed => evidence.flags.phishing_detected,
            RiskFactor::DataBreach => evidence.flags.breached,
            RiskFactor::GpsLocation => evidence.flags.location_exposed,
            RiskFactor::AbuseReports => evidence
                .signals(SignalKind::ReputationScore)
                .any(|s| match &s.payload {
                    SignalPayload::ReputationScore(rep) => {
                        rep.abuse_confidence >= self.policy.abuse_threshold
                    }
                    _ => false,
                }),
            RiskFactor::PasteExposure => evidence.has(SignalKind::PasteExposure),
            RiskFactor::NewlyRegisteredDomain => whois(evidence)
                .and_then(|w| w.created)
                .zip(Duration::try_days(self.policy.recent_registration_days))
                .map(|(created, window)| {
                    let age = evidence.collected_at - created;
                    age >= Duration::zero() && age <= window
                })
                .unwrap_or(false),
            RiskFactor::CameraFingerprint => evidence.has(SignalKind::ExifCamera),
            RiskFactor::EditedImage => evidence.has(SignalKind::ExifEditHistory),
            RiskFactor::ExpiredDomain => whois(evidence)
                .and_then(|w| w.expires)
                .map(|expires| expires < evidence.collected_at)
                .unwrap_or(false),
            RiskFactor::CaptureTimestamp => evidence.has(SignalKind::ExifCaptureTime),
        }
    }

    /// Score merged evidence
    pub fn score(&self, evidence: MergedEvidence) -> RiskReport {
        let factors = self.triggered(&evidence);

        let mut sum: u32 = 0;
        let mut floor: u8 = 0;
        let mut recommendations = Vec::with_capacity(factors.len().max(1));

        for &factor in &factors {
            let policy = self.policy.factor(factor);
            sum = sum.saturating_add(policy.weight);
            floor = floor.max(policy.floor.unwrap_or(0));
            recommendations.push(policy.recommendation);
        }

        if recommendations.is_empty() {
            recommendations.push(NO_SIGNIFICANT_RISK.to_string());
        }

        let score = sum.max(u32::from(floor)).min(u32::from(MAX_SCORE)) as u8;

        RiskReport {
            score,
            level: self.policy.level_for(score),
            recommendations,
            factors,
            evidence,
        }
    }
}

/// Score evidence against a policy
pub fn score(evidence: MergedEvidence, policy: &ScoringPolicy) -> RiskReport {
    RiskScorer::new(policy.clone()).score(evidence)
}

fn whois(evidence: &MergedEvidence) -> Option<&crate::WhoisRecord> {
    match evidence.single(SignalKind::WhoisRecord).map(|s| &s.payload) {
        Some(SignalPayload::WhoisRecord(record)) => Some(record),
        _ => None,
    }
}
