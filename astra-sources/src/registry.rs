//! Adapter registration
//!
//! Builds the adapter list in a fixed registration order. Adapters whose
//! required key is missing, or that the config disables, are skipped.

use astra_core::{ids, known_source, SubjectKind};
use astra_net::{create_client, NetError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    AbuseIpDbAdapter, CrtShAdapter, ExifAdapter, GoogleDnsAdapter, HibpBreaches, HibpPastes,
    PhishTankAdapter, RdapAdapter, RetryPolicy, Retrying, SourceAdapter, SourcesConfig,
    UrlhausAdapter, WhoisJsonApiAdapter,
};

/// Static facts about one shippable adapter
struct AdapterEntry {
    id: &'static str,
    accepts: &'static [SubjectKind],
    /// Environment variable of a required key
    required_key: Option<&'static str>,
}

/// Registration order
const ADAPTERS: &[AdapterEntry] = &[
    AdapterEntry {
        id: ids::EXIF,
        accepts: ExifAdapter::ACCEPTS,
        required_key: None,
    },
    AdapterEntry {
        id: ids::HIBP_BREACHES,
        accepts: HibpBreaches::ACCEPTS,
        required_key: Some("HIBP_API_KEY"),
    },
    AdapterEntry {
        id: ids::HIBP_PASTES,
        accepts: HibpPastes::ACCEPTS,
        required_key: Some("HIBP_API_KEY"),
    },
    AdapterEntry {
        id: ids::RDAP,
        accepts: RdapAdapter::ACCEPTS,
        required_key: None,
    },
    AdapterEntry {
        id: ids::WHOISJSONAPI,
        accepts: WhoisJsonApiAdapter::ACCEPTS,
        required_key: None,
    },
    AdapterEntry {
        id: ids::CRTSH,
        accepts: CrtShAdapter::ACCEPTS,
        required_key: None,
    },
    AdapterEntry {
        id: ids::GOOGLE_DNS,
        accepts: GoogleDnsAdapter::ACCEPTS,
        required_key: None,
    },
    AdapterEntry {
        id: ids::ABUSEIPDB,
        accepts: AbuseIpDbAdapter::ACCEPTS,
        required_key: Some("ABUSEIPDB_API_KEY"),
    },
    AdapterEntry {
        id: ids::URLHAUS,
        accepts: UrlhausAdapter::ACCEPTS,
        required_key: None,
    },
    AdapterEntry {
        id: ids::PHISHTANK,
        accepts: PhishTankAdapter::ACCEPTS,
        required_key: None,
    },
];

/// What `astra sources` prints for one adapter
#[derive(Debug, Clone, Serialize)]
pub struct AdapterInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub accepts: Vec<SubjectKind>,
    pub required_key: Option<&'static str>,
    /// Required key present (always true when none is required)
    pub configured: bool,
    pub enabled: bool,
}

impl AdapterInfo {
    pub fn registered(&self) -> bool {
        self.configured && self.enabled
    }
}

fn key_present(config: &SourcesConfig, id: &str) -> bool {
    match id {
        ids::HIBP_BREACHES | ids::HIBP_PASTES => config.hibp_api_key.is_some(),
        ids::ABUSEIPDB => config.abuseipdb_api_key.is_some(),
        _ => true,
    }
}

/// Describe every shippable adapter under `config`
pub fn describe_adapters(config: &SourcesConfig) -> Vec<AdapterInfo> {
    ADAPTERS
        .iter()
        .map(|entry| AdapterInfo {
            id: entry.id,
            name: known_source(entry.id).map(|s| s.name).unwrap_or(entry.id),
            accepts: entry.accepts.to_vec(),
            required_key: entry.required_key,
            configured: key_present(config, entry.id),
            enabled: config.is_enabled(entry.id),
        })
        .collect()
}

/// Build the registered adapters, sharing one HTTP client
///
/// `timeout` bounds each HTTP exchange. With `retry.retries > 0` every
/// network adapter is wrapped in [`Retrying`].
pub fn build_adapters(
    config: &SourcesConfig,
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<Vec<Arc<dyn SourceAdapter>>, NetError> {
    let client = create_client(&config.http_config(timeout))?;
    let endpoints = &config.endpoints;
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    for info in describe_adapters(config) {
        if !info.registered() {
            debug!(
                "Skipping {} (configured: {}, enabled: {})",
                info.id, info.configured, info.enabled
            );
            continue;
        }

        let adapter: Arc<dyn SourceAdapter> = match info.id {
            ids::EXIF => Arc::new(ExifAdapter::new()),
            ids::HIBP_BREACHES => Arc::new(HibpBreaches::new(
                client.clone(),
                &endpoints.hibp,
                config.hibp_api_key.as_deref().unwrap_or_default(),
            )),
            ids::HIBP_PASTES => Arc::new(HibpPastes::new(
                client.clone(),
                &endpoints.hibp,
                config.hibp_api_key.as_deref().unwrap_or_default(),
            )),
            ids::RDAP => Arc::new(RdapAdapter::new(client.clone(), &endpoints.rdap)),
            ids::WHOISJSONAPI => Arc::new(WhoisJsonApiAdapter::new(
                client.clone(),
                &endpoints.whoisjsonapi,
                config.whoisjsonapi_api_key.clone(),
            )),
            ids::CRTSH => Arc::new(CrtShAdapter::new(
                client.clone(),
                &endpoints.crtsh,
                config.max_certificates,
            )),
            ids::GOOGLE_DNS => Arc::new(GoogleDnsAdapter::new(client.clone(), &endpoints.google_dns)),
            ids::ABUSEIPDB => Arc::new(AbuseIpDbAdapter::new(
                client.clone(),
                &endpoints.abuseipdb,
                config.abuseipdb_api_key.as_deref().unwrap_or_default(),
            )),
            ids::URLHAUS => Arc::new(UrlhausAdapter::new(client.clone(), &endpoints.urlhaus)),
            ids::PHISHTANK => Arc::new(PhishTankAdapter::new(
                client.clone(),
                &endpoints.phishtank,
                config.phishtank_app_key.clone(),
            )),
            _ => continue,
        };

        // The local adapter cannot fail transiently
        let adapter = if retry.retries > 0 && info.id != ids::EXIF {
            Arc::new(Retrying::new(adapter, retry)) as Arc<dyn SourceAdapter>
        } else {
            adapter
        };
        adapters.push(adapter);
    }

    info!("Registered {} source adapters", adapters.len());
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyless() -> SourcesConfig {
        SourcesConfig {
            hibp_api_key: None,
            abuseipdb_api_key: None,
            phishtank_app_key: None,
            whoisjsonapi_api_key: None,
            ..SourcesConfig::default()
        }
    }

    fn ids_of(adapters: &[Arc<dyn SourceAdapter>]) -> Vec<String> {
        adapters.iter().map(|a| a.id().to_string()).collect()
    }

    #[test]
    fn test_keyless_registration_skips_keyed_sources() {
        let adapters =
            build_adapters(&keyless(), Duration::from_secs(5), RetryPolicy::default()).unwrap();
        assert_eq!(
            ids_of(&adapters),
            vec![
                ids::EXIF,
                ids::RDAP,
                ids::WHOISJSONAPI,
                ids::CRTSH,
                ids::GOOGLE_DNS,
                ids::URLHAUS,
                ids::PHISHTANK,
            ]
        );
    }

    #[test]
    fn test_keys_and_disabled() {
        let config = SourcesConfig {
            hibp_api_key: Some("hibp".to_string()),
            ..keyless()
        }
        .with_disabled(ids::PHISHTANK)
        .with_disabled(ids::WHOISJSONAPI);

        let adapters =
            build_adapters(&config, Duration::from_secs(5), RetryPolicy::default().with_retries(2))
                .unwrap();
        let registered = ids_of(&adapters);

        assert!(registered.contains(&ids::HIBP_BREACHES.to_string()));
        assert!(registered.contains(&ids::HIBP_PASTES.to_string()));
        assert!(!registered.contains(&ids::PHISHTANK.to_string()));
        assert!(!registered.contains(&ids::WHOISJSONAPI.to_string()));
        assert!(!registered.contains(&ids::ABUSEIPDB.to_string()));
    }

    #[test]
    fn test_describe_reports_missing_keys() {
        let infos = describe_adapters(&keyless());
        let abuse = infos.iter().find(|i| i.id == ids::ABUSEIPDB).unwrap();
        assert!(!abuse.configured);
        assert_eq!(abuse.required_key, Some("ABUSEIPDB_API_KEY"));
        assert_eq!(abuse.name, "AbuseIPDB");

        let dns = infos.iter().find(|i| i.id == ids::GOOGLE_DNS).unwrap();
        assert!(dns.registered());
        assert_eq!(
            dns.accepts,
            vec![SubjectKind::Domain, SubjectKind::Url, SubjectKind::Email]
        );
    }
}
