//! AbuseIPDB reputation adapter

use async_trait::async_trait;
use astra_core::{
    ids, Failure, ReputationScore, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind,
};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use tracing::debug;

use crate::{unsupported, SourceAdapter};

/// Reports older than this are ignored by the provider
const MAX_AGE_DAYS: u32 = 90;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbuseReport {
    abuse_confidence_score: Option<u8>,
    #[serde(default)]
    total_reports: u32,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
}

/// The API wraps the report in `data`; some deployments return it flat
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AbuseEnvelope {
    Wrapped { data: AbuseReport },
    Flat(AbuseReport),
}

/// Abuse reputation for a host
pub struct AbuseIpDbAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AbuseIpDbAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Domain, SubjectKind::Url];

    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Lookup path for a host: addresses go to `check`, names to `domain`
    pub fn lookup_path(host: &str) -> String {
        if host.parse::<IpAddr>().is_ok() {
            format!(
                "check?ipAddress={}&maxAgeInDays={}",
                urlencoding::encode(host),
                MAX_AGE_DAYS
            )
        } else {
            format!("domain?domain={}", urlencoding::encode(host))
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let report = match response.json::<AbuseEnvelope>() {
            Ok(AbuseEnvelope::Wrapped { data }) => data,
            Ok(AbuseEnvelope::Flat(report)) => report,
            Err(failure) => return failure.into(),
        };

        let Some(confidence) = report.abuse_confidence_score else {
            return Failure::malformed("missing abuseConfidenceScore").into();
        };

        let signal = Signal::builder(SignalPayload::ReputationScore(ReputationScore {
            abuse_confidence: confidence.min(100),
            total_reports: report.total_reports,
            isp: report.isp,
            country_code: report.country_code,
        }))
        .source(ids::ABUSEIPDB)
        .build();

        SourceOutcome::Signals(vec![signal])
    }
}

#[async_trait]
impl SourceAdapter for AbuseIpDbAdapter {
    fn id(&self) -> &str {
        ids::ABUSEIPDB
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let host = match subject {
            Subject::Domain(_) | Subject::Url(_) => subject.host().unwrap_or_default(),
            _ => return unsupported(self.id(), subject),
        };

        let url = format!("{}/{}", self.base_url, Self::lookup_path(host));
        debug!("Reputation lookup for {}", host);

        let request = self
            .client
            .get(&url)
            .header("Key", &self.api_key)
            .header("Accept", "application/json");
        match send(request).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        }
    }
}
