//! Have I Been Pwned adapters
//!
//! Two endpoints, two adapters: `breachedaccount` yields breach records and
//! `pasteaccount` yields paste exposures. A 404 from either means the account
//! is clean.

use async_trait::async_trait;
use astra_core::{
    ids, BreachRecord, BreachSeverity, Failure, PasteRecord, Signal, SignalPayload,
    SourceOutcome, Subject, SubjectKind,
};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{unsupported, SourceAdapter};

const API_KEY_HEADER: &str = "hibp-api-key";

/// Breach entry as returned by `breachedaccount?truncateResponse=false`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HibpBreach {
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    breach_date: Option<String>,
    #[serde(default)]
    data_classes: Vec<String>,
    #[serde(default)]
    is_verified: bool,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    is_spam_list: bool,
}

impl HibpBreach {
    fn severity(&self) -> BreachSeverity {
        if self.is_active {
            BreachSeverity::Critical
        } else if self.is_spam_list {
            BreachSeverity::Medium
        } else {
            BreachSeverity::High
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HibpPaste {
    source: String,
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    email_count: u32,
}

/// Breaches containing an email address
pub struct HibpBreaches {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HibpBreaches {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Email];

    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if response.status == 404 {
            return Failure::not_found("no breaches for this account").into();
        }
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let breaches: Vec<HibpBreach> = match response.json() {
            Ok(breaches) => breaches,
            Err(failure) => return failure.into(),
        };
        if breaches.is_empty() {
            return Failure::not_found("no breaches for this account").into();
        }

        let signals = breaches
            .into_iter()
            .map(|breach| {
                let severity = breach.severity();
                Signal::builder(SignalPayload::BreachRecord(BreachRecord {
                    name: breach.name,
                    title: breach.title,
                    breach_date: breach.breach_date,
                    data_classes: breach.data_classes,
                    is_verified: breach.is_verified,
                    severity,
                }))
                .source(ids::HIBP_BREACHES)
                .build()
            })
            .collect();

        SourceOutcome::Signals(signals)
    }
}

#[async_trait]
impl SourceAdapter for HibpBreaches {
    fn id(&self) -> &str {
        ids::HIBP_BREACHES
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let Some(email) = subject.as_email() else {
            return unsupported(self.id(), subject);
        };

        let url = format!(
            "{}/breachedaccount/{}?truncateResponse=false",
            self.base_url,
            urlencoding::encode(email)
        );
        debug!("Checking breaches for {}", email);

        let request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
        match send(request).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        }
    }
}

/// Public pastes mentioning an email address
pub struct HibpPastes {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HibpPastes {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Email];

    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if response.status == 404 {
            return Failure::not_found("no pastes for this account").into();
        }
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let pastes: Vec<HibpPaste> = match response.json() {
            Ok(pastes) => pastes,
            Err(failure) => return failure.into(),
        };
        if pastes.is_empty() {
            return Failure::not_found("no pastes for this account").into();
        }

        let signals = pastes
            .into_iter()
            .map(|paste| {
                Signal::builder(SignalPayload::PasteExposure(PasteRecord {
                    site: paste.source,
                    id: paste.id,
                    title: paste.title,
                    date: paste.date,
                    email_count: paste.email_count,
                }))
                .source(ids::HIBP_PASTES)
                .build()
            })
            .collect();

        SourceOutcome::Signals(signals)
    }
}

#[async_trait]
impl SourceAdapter for HibpPastes {
    fn id(&self) -> &str {
        ids::HIBP_PASTES
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let Some(email) = subject.as_email() else {
            return unsupported(self.id(), subject);
        };

        let url = format!(
            "{}/pasteaccount/{}",
            self.base_url,
            urlencoding::encode(email)
        );
        debug!("Checking pastes for {}", email);

        let request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
        match send(request).await {
            Ok(response) => Self::decode(&response),
            Err(failure) => failure.into(),
        }
    }
}
