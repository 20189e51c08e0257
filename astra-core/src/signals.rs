//! Provider-agnostic signals
//!
//! A signal is one fact contributed by one source about a subject:
//! - The payload is a typed, kind-specific value (never raw provider JSON)
//! - The kind is derived from the payload, so the two cannot disagree
//! - Confidence defaults to 1.0 unless the source itself is probabilistic
//! - A content fingerprint identifies equal payloads across sources

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{DEFAULT_CONFIDENCE, FINGERPRINT_LEN};

/// Kinds of facts a source can contribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    BreachRecord,
    PasteExposure,
    WhoisRecord,
    CertificateRecord,
    DnsRecord,
    ReputationScore,
    ThreatListHit,
    ExifCamera,
    ExifGps,
    ExifCaptureTime,
    ExifEditHistory,
}

impl SignalKind {
    pub const ALL: [SignalKind; 11] = [
        SignalKind::BreachRecord,
        SignalKind::PasteExposure,
        SignalKind::WhoisRecord,
        SignalKind::CertificateRecord,
        SignalKind::DnsRecord,
        SignalKind::ReputationScore,
        SignalKind::ThreatListHit,
        SignalKind::ExifCamera,
        SignalKind::ExifGps,
        SignalKind::ExifCaptureTime,
        SignalKind::ExifEditHistory,
    ];

    /// Single-valued kinds keep exactly one winning signal after merging;
    /// every other kind keeps all distinct entries
    pub fn is_single_valued(self) -> bool {
        matches!(
            self,
            SignalKind::WhoisRecord
                | SignalKind::ExifCamera
                | SignalKind::ExifGps
                | SignalKind::ExifCaptureTime
                | SignalKind::ExifEditHistory
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::BreachRecord => "breach_record",
            SignalKind::PasteExposure => "paste_exposure",
            SignalKind::WhoisRecord => "whois_record",
            SignalKind::CertificateRecord => "certificate_record",
            SignalKind::DnsRecord => "dns_record",
            SignalKind::ReputationScore => "reputation_score",
            SignalKind::ThreatListHit => "threat_list_hit",
            SignalKind::ExifCamera => "exif_camera",
            SignalKind::ExifGps => "exif_gps",
            SignalKind::ExifCaptureTime => "exif_capture_time",
            SignalKind::ExifEditHistory => "exif_edit_history",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a breach is for the account owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachSeverity {
    Medium,
    High,
    Critical,
}

/// One known breach containing the subject's account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachRecord {
    pub name: String,
    pub title: Option<String>,
    pub breach_date: Option<String>,
    pub data_classes: Vec<String>,
    pub is_verified: bool,
    pub severity: BreachSeverity,
}

/// A public paste mentioning the subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasteRecord {
    /// Paste site (Pastebin, Ghostbin, ...)
    pub site: String,
    pub id: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub email_count: u32,
}

/// Consolidated registration data for a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub registrar: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub nameservers: Vec<String>,
    pub registrant_country: Option<String>,
}

/// A certificate logged in certificate transparency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub issuer: String,
    pub common_name: String,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub serial_number: Option<String>,
}

/// One resolver answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAnswer {
    /// Record type mnemonic (A, AAAA, MX, ...)
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
}

/// Abuse reputation as reported by one reputation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationScore {
    /// 0 (clean) - 100 (certainly abusive)
    pub abuse_confidence: u8,
    pub total_reports: u32,
    pub isp: Option<String>,
    pub country_code: Option<String>,
}

/// Which kind of blocklist matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Malware,
    Phishing,
}

/// The subject appears on a malware or phishing list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatListHit {
    pub category: ThreatCategory,
    /// List name (URLhaus, PhishTank, ...)
    pub list: String,
    /// Link to the list entry
    pub reference: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraFingerprint {
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    /// The serial itself is never carried, only whether one was embedded
    pub serial_present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTime {
    pub raw: String,
    pub parsed: Option<NaiveDateTime>,
}

impl CaptureTime {
    /// Parse exiftool's `YYYY:MM:DD HH:MM:SS` layout, keeping the raw text
    pub fn from_exif(raw: &str) -> Self {
        let parsed = NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok();
        Self {
            raw: raw.trim().to_string(),
            parsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditHistory {
    pub software: Option<String>,
    pub edits: Vec<String>,
}

/// Kind-specific signal payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    BreachRecord(BreachRecord),
    PasteExposure(PasteRecord),
    WhoisRecord(WhoisRecord),
    CertificateRecord(CertificateRecord),
    DnsRecord(DnsAnswer),
    ReputationScore(ReputationScore),
    ThreatListHit(ThreatListHit),
    ExifCamera(CameraFingerprint),
    ExifGps(GpsFix),
    ExifCaptureTime(CaptureTime),
    ExifEditHistory(EditHistory),
}

impl SignalPayload {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalPayload::BreachRecord(_) => SignalKind::BreachRecord,
            SignalPayload::PasteExposure(_) => SignalKind::PasteExposure,
            SignalPayload::WhoisRecord(_) => SignalKind::WhoisRecord,
            SignalPayload::CertificateRecord(_) => SignalKind::CertificateRecord,
            SignalPayload::DnsRecord(_) => SignalKind::DnsRecord,
            SignalPayload::ReputationScore(_) => SignalKind::ReputationScore,
            SignalPayload::ThreatListHit(_) => SignalKind::ThreatListHit,
            SignalPayload::ExifCamera(_) => SignalKind::ExifCamera,
            SignalPayload::ExifGps(_) => SignalKind::ExifGps,
            SignalPayload::ExifCaptureTime(_) => SignalKind::ExifCaptureTime,
            SignalPayload::ExifEditHistory(_) => SignalKind::ExifEditHistory,
        }
    }
}

/// One fact from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Adapter identity that produced the signal
    pub source: String,

    pub payload: SignalPayload,

    /// Source's confidence (0.0 - 1.0)
    pub confidence: f64,

    /// Content-based hash of the payload, equal for equal payloads
    pub fingerprint: String,
}

impl Signal {
    /// Create a new signal builder
    pub fn builder(payload: SignalPayload) -> SignalBuilder {
        SignalBuilder::new(payload)
    }

    pub fn kind(&self) -> SignalKind {
        self.payload.kind()
    }

    fn compute_fingerprint(payload: &SignalPayload) -> String {
        let mut hasher = Sha256::new();
        let payload_json = serde_json::to_string(payload).unwrap_or_default();
        hasher.update(payload_json.as_bytes());
        format!("{:x}", hasher.finalize())[..FINGERPRINT_LEN].to_string()
    }
}

/// Builder for signals
pub struct SignalBuilder {
    payload: SignalPayload,
    confidence: f64,
    source: String,
}

impl SignalBuilder {
    pub fn new(payload: SignalPayload) -> Self {
        Self {
            payload,
            confidence: DEFAULT_CONFIDENCE,
            source: String::new(),
        }
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn build(self) -> Signal {
        let fingerprint = Signal::compute_fingerprint(&self.payload);

        Signal {
            source: self.source,
            payload: self.payload,
            confidence: self.confidence,
            fingerprint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dns(value: &str) -> SignalPayload {
        SignalPayload::DnsRecord(DnsAnswer {
            record_type: "A".to_string(),
            value: value.to_string(),
            ttl: 300,
        })
    }

    #[test]
    fn test_signal_creation() {
        let signal = Signal::builder(dns("93.184.216.34"))
            .source("google-dns")
            .build();

        assert_eq!(signal.kind(), SignalKind::DnsRecord);
        assert_eq!(signal.confidence, 1.0);
        assert_eq!(signal.fingerprint.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_ignores_source() {
        let a = Signal::builder(dns("1.1.1.1")).source("a").build();
        let b = Signal::builder(dns("1.1.1.1")).source("b").confidence(0.4).build();
        let c = Signal::builder(dns("1.0.0.1")).source("a").build();

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let signal = Signal::builder(dns("1.1.1.1")).confidence(3.0).build();
        assert_eq!(signal.confidence, 1.0);
        let signal = Signal::builder(dns("1.1.1.1")).confidence(f64::NAN).build();
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_single_valued_kinds() {
        assert!(SignalKind::WhoisRecord.is_single_valued());
        assert!(SignalKind::ExifGps.is_single_valued());
        assert!(!SignalKind::BreachRecord.is_single_valued());
        assert!(!SignalKind::DnsRecord.is_single_valued());
    }

    #[test]
    fn test_capture_time_parsing() {
        let time = CaptureTime::from_exif("2024:05:01 10:22:03");
        assert!(time.parsed.is_some());
        let time = CaptureTime::from_exif("yesterday");
        assert!(time.parsed.is_none());
        assert_eq!(time.raw, "yesterday");
    }
}
