//! RDAP adapter
//!
//! Registration data from the registry itself via the rdap.org bootstrap
//! redirector. The authoritative source for WHOIS-style facts.

use async_trait::async_trait;
use astra_core::{ids, Failure, Signal, SignalPayload, SourceOutcome, Subject, SubjectKind, WhoisRecord};
use astra_net::{send, RawResponse};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::dates::parse_timestamp;
use crate::{unsupported, SourceAdapter};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapDomain {
    #[serde(default)]
    events: Vec<RdapEvent>,
    #[serde(default)]
    entities: Vec<RdapEntity>,
    #[serde(default)]
    nameservers: Vec<RdapNameserver>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEvent {
    event_action: String,
    event_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEntity {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    vcard_array: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapNameserver {
    ldh_name: String,
}

impl RdapEntity {
    fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Look up one vCard property (`["vcard", [[name, params, type, value], ...]]`)
    fn vcard_property(&self, name: &str) -> Option<&Value> {
        self.vcard_array
            .as_ref()?
            .get(1)?
            .as_array()?
            .iter()
            .find(|prop| prop.get(0).and_then(Value::as_str) == Some(name))
            .and_then(|prop| prop.get(3))
    }

    fn formatted_name(&self) -> Option<String> {
        self.vcard_property("fn")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
    }

    /// Country from the structured `adr` value, or the `cc` parameter
    fn country(&self) -> Option<String> {
        let properties = self.vcard_array.as_ref()?.get(1)?.as_array()?;
        let adr = properties
            .iter()
            .find(|prop| prop.get(0).and_then(Value::as_str) == Some("adr"))?;

        if let Some(cc) = adr.get(1).and_then(|p| p.get("cc")).and_then(Value::as_str) {
            return Some(cc.to_uppercase());
        }
        adr.get(3)
            .and_then(Value::as_array)
            .and_then(|parts| parts.get(6))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(String::from)
    }
}

/// RDAP registration lookups
pub struct RdapAdapter {
    client: Client,
    base_url: String,
}

impl RdapAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::Domain, SubjectKind::Url];

    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn decode(response: &RawResponse) -> SourceOutcome {
        if response.status == 404 {
            return Failure::not_found("domain not registered").into();
        }
        if let Some(failure) = response.failure() {
            return failure.into();
        }

        let domain: RdapDomain = match response.json() {
            Ok(domain) => domain,
            Err(failure) => return failure.into(),
        };

        let event = |action: &str| {
            domain
                .events
                .iter()
                .find(|e| e.event_action.eq_ignore_ascii_case(action))
                .and_then(|e| parse_timestamp(&e.event_date))
        };

        let registrar = domain
            .entities
            .iter()
            .filter(|e| e.has_role("registrar"))
            .find_map(RdapEntity::formatted_name);

        let registrant_country = domain
            .entities
            .iter()
            .filter(|e| e.has_role("registrant"))
            .find_map(RdapEntity::country);

        let record = WhoisRecord {
            registrar,
            created: event("registration"),
            expires: event("expiration"),
            nameservers: domain
                .nameservers
                .iter()
                .map(|ns| ns.ldh_name.to_lowercase())
                .collect(),
            registrant_country,
        };

        let signal = Signal::builder(SignalPayload::WhoisRecord(record))
            .source(ids::RDAP)
            .build();
        SourceOutcome::Signals(vec![signal])
    }
}

#[async_trait]
impl SourceAdapter for RdapAdapter {
    fn id(&self) -> &str {
        ids::RDAP
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        let host = match subject {
            Subject::Domain(_) | Subject::Url(_) => subject.host().unwrap_or_default(),
            _ => return unsupported(self.id(), subject),
        };

        let url = format!("{}/domain/{}", self.base_url, host);
        debug!("RDAP lookup for {}", host);

        let request = self
            .client
            .get(&url)
            .header("Accept", "application/rdap+json");
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

    const EXAMPLE: &str = r#"{
        "objectClassName": "domain",
        "ldhName": "EXAMPLE.COM",
        "events": [
            {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
            {"eventAction": "expiration", "eventDate": "2025-08-13T04:00:00Z"}
        ],
        "entities": [
            {"roles": ["registrar"],
             "vcardArray": ["vcard", [["version", {}, "text", "4.0"], ["fn", {}, "text", "RESERVED-Internet Assigned Numbers Authority"]]]},
            {"roles": ["registrant"],
             "vcardArray": ["vcard", [["adr", {"cc": "us"}, "text", ["", "", "", "", "", "", ""]]]]}
        ],
        "nameservers": [{"ldhName": "A.IANA-SERVERS.NET"}, {"ldhName": "B.IANA-SERVERS.NET"}]
    }"#;

    #[test]
    fn test_decode_domain() {
        let outcome = RdapAdapter::decode(&RawResponse::new(200, EXAMPLE));
        let signals = outcome.signals();
        assert_eq!(signals.len(), 1);

        match &signals[0].payload {
            SignalPayload::WhoisRecord(record) => {
                assert_eq!(
                    record.registrar.as_deref(),
                    Some("RESERVED-Internet Assigned Numbers Authority")
                );
                assert_eq!(record.created.map(|d| d.year()), Some(1995));
                assert_eq!(record.expires.map(|d| d.year()), Some(2025));
                assert_eq!(record.nameservers, vec!["a.iana-servers.net", "b.iana-servers.net"]);
                assert_eq!(record.registrant_country.as_deref(), Some("US"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_domain() {
        let outcome = RdapAdapter::decode(&RawResponse::new(404, ""));
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::NotFound));
    }

    #[test]
    fn test_garbage_body() {
        let outcome = RdapAdapter::decode(&RawResponse::new(200, "<html>rate limited</html>"));
        assert_eq!(outcome.as_failure().map(|f| f.kind), Some(FailureKind::Malformed));
    }
}
