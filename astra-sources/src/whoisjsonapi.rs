//! WhoisJsonApi adapter
//!
//! Secondary WHOIS source. Field names vary between records, so both the
//! `registrar_*` and `registrant_*` spellings are read.

use async_trait::async_trait;
use astra_core::{ids, Failure, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind, WhoisRecord};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::dates::parse_timestamp;
use crate::{unsupported, SourceAdapter};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WhoisResponse {
    registrar_name: Option<String>,
    registrar: Option<String>,
    registrar_registration_date: Option<String>,
    registrant_created: Option<String>,
    registrar_expiration_date: Option<String>,
    registrant_expired: Option<String>,
    nameservers: Vec<String>,
    registrant_country: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"))
}

/// WhoisJsonApi lookups
pub struct WhoisJsonApiAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl WhoisJsonApiAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Domain, SubjectKind::Url];

    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let whois: WhoisResponse = match response.json() {
            Ok(whois) => whois,
            Err(failure) => return failure.into(),
        };

        let created = non_empty(whois.registrar_registration_date)
            .or(non_empty(whois.registrant_created));
        let expires = non_empty(whois.registrar_expiration_date)
            .or(non_empty(whois.registrant_expired));

        let record = WhoisRecord {
            registrar: non_empty(whois.registrar_name).or(non_empty(whois.registrar)),
            created: created.as_deref().and_then(parse_timestamp),
            expires: expires.as_deref().and_then(parse_timestamp),
            nameservers: whois
                .nameservers
                .iter()
                .map(|ns| ns.trim().to_lowercase())
                .filter(|ns| !ns.is_empty())
                .collect(),
            registrant_country: non_empty(whois.registrant_country),
        };

        if record.registrar.is_none()
            && record.created.is_none()
            && record.expires.is_none()
            && record.nameservers.is_empty()
        {
            return Failure::not_found("no registration data").into();
        }

        let signal = Signal::builder(SignalPayload::WhoisRecord(record))
            .source(ids::WHOISJSONAPI)
            .build();
        SourceOutcome::Signals(vec![signal])
    }
}

#[async_trait]
impl SourceAdapter for WhoisJsonApiAdapter {
    fn id(&self) -> &str {
        ids::WHOISJSONAPI
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
            "{}/whois?domain={}",
            self.base_url,
            urlencoding::encode(host)
        );
        debug!("WHOIS lookup for {}", host);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match send(request).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::FailureKind;
    use chrono::Datelike;

    #[test]
    fn test_decode_registrar_fields() {
        let body = r#"{
            "registrar_name": "NameCheap, Inc.",
            "registrar_registration_date": "2024-12-30",
            "registrar_expiration_date": "2025-12-30T10:11:12Z",
            "nameservers": ["DNS1.REGISTRAR-SERVERS.COM", ""],
            "registrant_country": "IS"
        }"#;

        let outcome = WhoisJsonApiAdapter::decode(&RawResponse::new(200, body));
        match &outcome.signals()[0].payload {
            SignalPayload::WhoisRecord(record) => {
                assert_eq!(record.registrar.as_deref(), Some("NameCheap, Inc."));
                assert_eq!(record.created.map(|d| d.day()), Some(30));
                assert_eq!(record.expires.map(|d| d.year()), Some(2025));
                assert_eq!(record.nameservers, vec!["dns1.registrar-servers.com"]);
                assert_eq!(record.registrant_country.as_deref(), Some("IS"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_fallback_field_names() {
        let body = r#"{"registrar": "Gandi SAS", "registrant_created": "2001-02-03"}"#;
        let outcome = WhoisJsonApiAdapter::decode(&RawResponse::new(200, body));
        match &outcome.signals()[0].payload {
            SignalPayload::WhoisRecord(record) => {
                assert_eq!(record.registrar.as_deref(), Some("Gandi SAS"));
                assert_eq!(record.created.map(|d| d.year()), Some(2001));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_empty_record_is_not_found() {
        let body = r#"{"registrar_name": "Unknown", "nameservers": []}"#;
        let outcome = WhoisJsonApiAdapter::decode(&RawResponse::new(200, body));
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::NotFound));
    }
}
