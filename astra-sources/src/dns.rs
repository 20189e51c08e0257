//! Google Public DNS (JSON API) adapter
//!
//! Resolves A records for domains and URL hosts, and MX records for the mail
//! domain of an email address.

use async_trait::async_trait;
use astra_core::{
    ids, DnsAnswer, Failure, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind,
};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{unsupported, SourceAdapter};

const NOERROR: u32 = 0;
const SERVFAIL: u32 = 2;
const NXDOMAIN: u32 = 3;

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<ResolveAnswer>,
}

#[derive(Debug, Deserialize)]
struct ResolveAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(rename = "TTL", default)]
    ttl: u32,
    data: String,
}

/// Mnemonic for a DNS record type number
pub fn record_type_name(record_type: u16) -> String {
    match record_type {
        1 => "A".to_string(),
        2 => "NS".to_string(),
        5 => "CNAME".to_string(),
        6 => "SOA".to_string(),
        15 => "MX".to_string(),
        16 => "TXT".to_string(),
        28 => "AAAA".to_string(),
        other => format!("TYPE{}", other),
    }
}

/// DNS resolution over HTTPS
pub struct GoogleDnsAdapter {
    client: Client,
    base_url: String,
}

impl GoogleDnsAdapter {
    pub const ACCEPTS: &'static [SubjectKind] =
        &[SubjectKind::Domain, SubjectKind::Url, SubjectKind::Email];

    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Record type queried for a subject
    pub fn query_type(subject: &Subject) -> &'static str {
        match subject.kind() {
            SubjectKind::Email => "MX",
            _ => "A",
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let resolved: ResolveResponse = match response.json() {
            Ok(resolved) => resolved,
            Err(failure) => return failure.into(),
        };

        match resolved.status {
            NOERROR => {}
            NXDOMAIN => return Failure::not_found("NXDOMAIN").into(),
            SERVFAIL => return Failure::unreachable("SERVFAIL").into(),
            other => return Failure::malformed(format!("resolver status {}", other)).into(),
        }

        if resolved.answer.is_empty() {
            return Failure::not_found("no answers").into();
        }

        let signals = resolved
            .answer
            .into_iter()
            .map(|answer| {
                Signal::builder(SignalPayload::DnsRecord(DnsAnswer {
                    record_type: record_type_name(answer.record_type),
                    value: answer.data.trim_end_matches('.').to_string(),
                    ttl: answer.ttl,
                }))
                .source(ids::GOOGLE_DNS)
                .build()
            })
            .collect();

        SourceOutcome::Signals(signals)
    }
}

#[async_trait]
impl SourceAdapter for GoogleDnsAdapter {
    fn id(&self) -> &str {
        ids::GOOGLE_DNS
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let Some(host) = subject.host() else {
            return unsupported(self.id(), subject);
        };
        let record_type = Self::query_type(subject);

        let url = format!(
            "{}/resolve?name={}&type={}",
            self.base_url,
            urlencoding::encode(host),
            record_type
        );
        debug!("Resolving {} {}", record_type, host);

        match send(self.client.get(&url)).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        }
    }
}
