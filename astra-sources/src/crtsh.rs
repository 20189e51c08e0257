//! crt.sh certificate transparency adapter

use async_trait::async_trait;
use astra_core::{
    ids, CertificateRecord, Failure, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind,
};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use std::cmp::Reverse;
use tracing::debug;

use crate::dates::parse_timestamp;
use crate::{unsupported, SourceAdapter};

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    issuer_name: String,
    #[serde(default)]
    common_name: String,
    #[serde(default)]
    not_before: Option<String>,
    #[serde(default)]
    not_after: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
}

/// Certificates logged for a host, most recent first
pub struct CrtShAdapter {
    client: Client,
    base_url: String,
    max_certificates: usize,
}

impl CrtShAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Domain, SubjectKind::Url];

    pub fn new(client: Client, base_url: &str, max_certificates: usize) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_certificates,
        }
    }

    pub fn decode(response: &RawResponse, max_certificates: usize) -> SourceOutcome {
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let mut entries: Vec<CrtShEntry> = match response.json() {
            Ok(entries) => entries,
            Err(failure) => return failure.into(),
        };
        if entries.is_empty() {
            return Failure::not_found("no logged certificates").into();
        }

        entries.sort_by_key(|e| {
            (
                Reverse(e.not_before.as_deref().and_then(parse_timestamp)),
                Reverse(e.id),
            )
        });

        let signals = entries
            .into_iter()
            .take(max_certificates)
            .map(|entry| {
                Signal::builder(SignalPayload::CertificateRecord(CertificateRecord {
                    issuer: entry.issuer_name,
                    common_name: entry.common_name,
                    not_before: entry.not_before.as_deref().and_then(parse_timestamp),
                    not_after: entry.not_after.as_deref().and_then(parse_timestamp),
                    serial_number: entry.serial_number,
                }))
                .source(ids::CRTSH)
                .build()
            })
            .collect();

        SourceOutcome::Signals(signals)
    }
}

#[async_trait]
impl SourceAdapter for CrtShAdapter {
    fn id(&self) -> &str {
        ids::CRTSH
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let host = match subject {
            Subject::Domain(_) | Subject::Url(_) => subject.host().unwrap_or_default(),
            _ => return unsupported(self.id(), subject),
        };

        let url = format!(
            "{}/?q={}&output=json",
            self.base_url,
            urlencoding::encode(host)
        );
        debug!("Certificate transparency lookup for {}", host);

        match send(self.client.get(&url)).await {
            Ok(response) => Self::decode(&response, self.max_certificates),
            Err(failure) => failure.into(),
        }
    }
}
