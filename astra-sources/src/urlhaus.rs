//! URLhaus malware URL list adapter

use async_trait::async_trait;
use astra_core::{
    ids, Failure, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind, ThreatCategory,
    ThreatListHit,
};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{unsupported, SourceAdapter};

#[derive(Debug, Deserialize)]
struct UrlhausResponse {
    query_status: String,
    #[serde(default)]
    url_status: Option<String>,
    #[serde(default)]
    threat: Option<String>,
    #[serde(default)]
    urlhaus_reference: Option<String>,
}

/// URLhaus lookups
pub struct UrlhausAdapter {
    client: Client,
    base_url: String,
}

impl UrlhausAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Url];

    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let result: UrlhausResponse = match response.json() {
            Ok(result) => result,
            Err(failure) => return failure.into(),
        };

        match result.query_status.as_str() {
            "ok" => {}
            "no_results" => return Failure::not_found("not listed").into(),
            other => return Failure::malformed(format!("query_status {}", other)).into(),
        }

        let detail = match (result.threat, result.url_status) {
            (Some(threat), Some(status)) => Some(format!("{} ({})", threat, status)),
            (Some(threat), None) => Some(threat),
            (None, status) => status,
        };

        let signal = Signal::builder(SignalPayload::ThreatListHit(ThreatListHit {
            category: ThreatCategory::Malware,
            list: "URLhaus".to_string(),
            reference: result.urlhaus_reference,
            detail,
        }))
        .source(ids::URLHAUS)
        .build();

        SourceOutcome::Signals(vec![signal])
    }
}

#[async_trait]
impl SourceAdapter for UrlhausAdapter {
    fn id(&self) -> &str {
        ids::URLHAUS
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let Some(url) = subject.as_url() else {
            return unsupported(self.id(), subject);
        };

        debug!("URLhaus lookup for {}", url);
        let request = self
            .client
            .post(format!("{}/url/", self.base_url))
            .form(&[("url", url)]);

        let outcome = match send(request).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        };
        if !outcome.is_failure() {
            info!("URLhaus lists {}", url);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::FailureKind;

    #[test]
    fn test_listed_url() {
        let body = r#"{"query_status": "ok", "id": "105821", "url_status": "online",
                       "threat": "malware_download",
                       "urlhaus_reference": "https://urlhaus.abuse.ch/url/105821/"}"#;

        let outcome = UrlhausAdapter::decode(&RawResponse::new(200, body));
        match &outcome.signals()[0].payload {
            SignalPayload::ThreatListHit(hit) => {
                assert_eq!(hit.category, ThreatCategory::Malware);
                assert_eq!(hit.detail.as_deref(), Some("malware_download (online)"));
                assert!(hit.reference.is_some());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unlisted_url() {
        let outcome =
            UrlhausAdapter::decode(&RawResponse::new(200, r#"{"query_status": "no_results"}"#));
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::NotFound));

        let outcome =
            UrlhausAdapter::decode(&RawResponse::new(200, r#"{"query_status": "invalid_url"}"#));
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::Malformed));
    }
}
