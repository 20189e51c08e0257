//! PhishTank phishing list adapter

use async_trait::async_trait;
use astra_core::{
    ids, Failure, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind, ThreatCategory,
    ThreatListHit,
};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{unsupported, SourceAdapter};

#[derive(Debug, Deserialize)]
struct PhishTankResponse {
    results: PhishTankResults,
}

#[derive(Debug, Deserialize)]
struct PhishTankResults {
    #[serde(default)]
    in_database: Value,
    #[serde(default)]
    valid: Value,
    #[serde(default)]
    verified: Value,
    #[serde(default)]
    phish_detail_page: Option<String>,
}

/// PhishTank answers booleans, and older deployments answer `"yes"`/`"no"`
fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "yes" | "true" | "y" => Some(true),
            "no" | "false" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// PhishTank lookups
pub struct PhishTankAdapter {
    client: Client,
    base_url: String,
    app_key: Option<String>,
}

impl PhishTankAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Url];

    pub fn new(client: Client, base_url: &str, app_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key,
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let result: PhishTankResponse = match response.json() {
            Ok(result) => result,
            Err(failure) => return failure.into(),
        };
        let results = result.results;

        let listed = truthy(&results.in_database).unwrap_or(false);
        // A listed URL that was reviewed and found not to be phishing
        let cleared = truthy(&results.valid) == Some(false);
        if !listed || cleared {
            return Failure::not_found("not a known phish").into();
        }

        let detail = match truthy(&results.verified) {
            Some(true) => "verified phish",
            _ => "unverified phish",
        };

        let signal = Signal::builder(SignalPayload::ThreatListHit(ThreatListHit {
            category: ThreatCategory::Phishing,
            list: "PhishTank".to_string(),
            reference: results.phish_detail_page,
            detail: Some(detail.to_string()),
        }))
        .source(ids::PHISHTANK)
        .build();

        SourceOutcome::Signals(vec![signal])
    }
}

#[async_trait]
impl SourceAdapter for PhishTankAdapter {
    fn id(&self) -> &str {
        ids::PHISHTANK
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let Some(url) = subject.as_url() else {
            return unsupported(self.id(), subject);
        };

        let mut form = vec![("url", url), ("format", "json")];
        if let Some(key) = &self.app_key {
            form.push(("app_key", key.as_str()));
        }

        debug!("PhishTank lookup for {}", url);
        let request = self
            .client
            .post(format!("{}/checkurl/", self.base_url))
            .form(&form);

        let outcome = match send(request).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        };
        if !outcome.is_failure() {
            info!("PhishTank lists {}", url);
        }
        outcome
    }
}
