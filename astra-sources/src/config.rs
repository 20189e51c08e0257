//! Source configuration
//!
//! API keys default from the environment; everything can be overlaid from a
//! TOML table. Keys missing from the table keep their defaults.

use astra_net::{HttpConfig, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Provider base URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub hibp: String,
    pub rdap: String,
    pub whoisjsonapi: String,
    pub crtsh: String,
    pub google_dns: String,
    pub abuseipdb: String,
    pub urlhaus: String,
    pub phishtank: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            hibp: "https://haveibeenpwned.com/api/v3".to_string(),
            rdap: "https://rdap.org".to_string(),
            whoisjsonapi: "https://www.whoisjsonapi.com/api/v1".to_string(),
            crtsh: "https://crt.sh".to_string(),
            google_dns: "https://dns.google".to_string(),
            abuseipdb: "https://api.abuseipdb.com/api/v2".to_string(),
            urlhaus: "https://urlhaus-api.abuse.ch/v1".to_string(),
            phishtank: "https://checkurl.phishtank.com".to_string(),
        }
    }
}

/// Configuration for external sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Have I Been Pwned API key (required for both HIBP adapters)
    pub hibp_api_key: Option<String>,
    /// AbuseIPDB API key (required)
    pub abuseipdb_api_key: Option<String>,
    /// PhishTank application key (optional, raises the rate limit)
    pub phishtank_app_key: Option<String>,
    /// WhoisJsonApi token (optional)
    pub whoisjsonapi_api_key: Option<String>,

    pub endpoints: Endpoints,

    /// Maximum certificates kept from certificate transparency
    pub max_certificates: usize,

    /// Adapter ids that must not be registered
    pub disabled: Vec<String>,

    /// Proxy for all provider traffic (http, https or socks5h)
    pub proxy: Option<String>,

    pub user_agent: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hibp_api_key: env_key("HIBP_API_KEY"),
            abuseipdb_api_key: env_key("ABUSEIPDB_API_KEY"),
            phishtank_app_key: env_key("PHISHTANK_APP_KEY"),
            whoisjsonapi_api_key: env_key("WHOISJSONAPI_API_KEY"),
            endpoints: Endpoints::default(),
            max_certificates: 5,
            disabled: Vec::new(),
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl SourcesConfig {
    /// Parse a `[sources]`-style TOML table
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn is_enabled(&self, adapter: &str) -> bool {
        !self.disabled.iter().any(|id| id == adapter)
    }

    pub fn with_disabled(mut self, adapter: &str) -> Self {
        self.disabled.push(adapter.to_string());
        self
    }

    /// HTTP settings for provider clients
    pub fn http_config(&self, timeout: Duration) -> HttpConfig {
        HttpConfig {
            proxy: self.proxy.clone(),
            user_agent: self.user_agent.clone(),
            ..HttpConfig::default()
        }
        .with_timeout(timeout)
    }
}
