//! Known source registry
//!
//! Lists the providers the engine knows about, which facts each one is the
//! authority on, and how far its answers can be trusted. The merger derives
//! its per-kind tie-break order from this table.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::SignalKind;

/// Adapter identities
pub mod ids {
    pub const HIBP_BREACHES: &str = "hibp-breaches";
    pub const HIBP_PASTES: &str = "hibp-pastes";
    pub const RDAP: &str = "rdap";
    pub const WHOISJSONAPI: &str = "whoisjsonapi";
    pub const CRTSH: &str = "crtsh";
    pub const GOOGLE_DNS: &str = "google-dns";
    pub const ABUSEIPDB: &str = "abuseipdb";
    pub const URLHAUS: &str = "urlhaus";
    pub const PHISHTANK: &str = "phishtank";
    pub const EXIF: &str = "exif";
}

/// A provider the engine knows about
#[derive(Debug, Clone, Serialize)]
pub struct KnownSource {
    /// Adapter identity
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    pub homepage: &'static str,
    /// Kinds for which this source is the primary authority
    pub authoritative_for: &'static [SignalKind],
    /// Estimated reliability (0.0 - 1.0)
    pub reliability: f64,
}

impl KnownSource {
    pub fn is_authoritative_for(&self, kind: SignalKind) -> bool {
        self.authoritative_for.contains(&kind)
    }
}

/// Every provider the engine ships an adapter for
pub static KNOWN_SOURCES: &[KnownSource] = &[
    KnownSource {
        id: ids::HIBP_BREACHES,
        name: "Have I Been Pwned (breaches)",
        homepage: "https://haveibeenpwned.com",
        authoritative_for: &[SignalKind::BreachRecord],
        reliability: 0.95,
    },
    KnownSource {
        id: ids::HIBP_PASTES,
        name: "Have I Been Pwned (pastes)",
        homepage: "https://haveibeenpwned.com",
        authoritative_for: &[SignalKind::PasteExposure],
        reliability: 0.9,
    },
    KnownSource {
        id: ids::RDAP,
        name: "RDAP",
        homepage: "https://rdap.org",
        authoritative_for: &[SignalKind::WhoisRecord],
        reliability: 0.95,
    },
    KnownSource {
        id: ids::WHOISJSONAPI,
        name: "WhoisJsonApi",
        homepage: "https://whoisjsonapi.com",
        authoritative_for: &[],
        reliability: 0.8,
    },
    KnownSource {
        id: ids::CRTSH,
        name: "crt.sh",
        homepage: "https://crt.sh",
        authoritative_for: &[SignalKind::CertificateRecord],
        reliability: 0.9,
    },
    KnownSource {
        id: ids::GOOGLE_DNS,
        name: "Google Public DNS",
        homepage: "https://dns.google",
        authoritative_for: &[SignalKind::DnsRecord],
        reliability: 0.95,
    },
    KnownSource {
        id: ids::ABUSEIPDB,
        name: "AbuseIPDB",
        homepage: "https://www.abuseipdb.com",
        authoritative_for: &[SignalKind::ReputationScore],
        reliability: 0.7,
    },
    KnownSource {
        id: ids::URLHAUS,
        name: "URLhaus",
        homepage: "https://urlhaus.abuse.ch",
        authoritative_for: &[SignalKind::ThreatListHit],
        reliability: 0.9,
    },
    KnownSource {
        id: ids::PHISHTANK,
        name: "PhishTank",
        homepage: "https://phishtank.org",
        authoritative_for: &[SignalKind::ThreatListHit],
        reliability: 0.85,
    },
    KnownSource {
        id: ids::EXIF,
        name: "Extracted image metadata",
        homepage: "https://exiftool.org",
        authoritative_for: &[
            SignalKind::ExifCamera,
            SignalKind::ExifGps,
            SignalKind::ExifCaptureTime,
            SignalKind::ExifEditHistory,
        ],
        reliability: 1.0,
    },
];

/// Look up a known source by adapter id
pub fn known_source(id: &str) -> Option<&'static KnownSource> {
    KNOWN_SOURCES.iter().find(|s| s.id == id)
}

/// Known sources sorted by reliability (highest first), ties by id
pub fn sources_by_reliability() -> Vec<&'static KnownSource> {
    let mut sources: Vec<_> = KNOWN_SOURCES.iter().collect();
    sources.sort_by(|a, b| b.reliability.total_cmp(&a.reliability).then(a.id.cmp(b.id)));
    sources
}

/// Fixed source-priority order, per signal kind
///
/// Lower rank wins. Sources missing from a kind's order rank after every
/// listed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePrecedence {
    general: Vec<String>,
    per_kind: BTreeMap<SignalKind, Vec<String>>,
}

impl SourcePrecedence {
    /// Rank of `source` for facts of `kind`
    pub fn rank(&self, kind: SignalKind, source: &str) -> usize {
        self.per_kind
            .get(&kind)
            .and_then(|order| order.iter().position(|s| s == source))
            .unwrap_or(usize::MAX)
    }

    /// Kind-independent rank, used to put results in canonical order
    pub fn general_rank(&self, source: &str) -> usize {
        self.general
            .iter()
            .position(|s| s == source)
            .unwrap_or(usize::MAX)
    }

    /// Replace the order for one kind
    pub fn with_order<I, S>(mut self, kind: SignalKind, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.per_kind
            .insert(kind, order.into_iter().map(Into::into).collect());
        self
    }
}

impl Default for SourcePrecedence {
    /// Authoritative sources first, then by reliability, then by id
    fn default() -> Self {
        let general = sources_by_reliability()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();

        let per_kind = SignalKind::ALL
            .iter()
            .map(|&kind| {
                let mut sources = sources_by_reliability();
                sources.sort_by_key(|s| !s.is_authoritative_for(kind));
                let order = sources.into_iter().map(|s| s.id.to_string()).collect();
                (kind, order)
            })
            .collect();

        Self { general, per_kind }
    }
}
