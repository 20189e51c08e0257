//! HTTP client construction

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// Proxy schemes the client can speak
const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Default user agent sent to providers
pub const DEFAULT_USER_AGENT: &str = concat!("astra/", env!("CARGO_PKG_VERSION"));

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Optional proxy URL (http, https or socks5h)
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Errors from setting up networking
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Invalid proxy {0}: {1}")]
    InvalidProxy(String, String),
}

/// Create an HTTP client for provider calls
pub fn create_client(config: &HttpConfig) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone());

    if let Some(proxy_url) = &config.proxy {
        check_proxy_scheme(proxy_url)?;
        let proxy = Proxy::all(proxy_url)
            .map_err(|e| NetError::InvalidProxy(proxy_url.clone(), e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}

fn check_proxy_scheme(proxy_url: &str) -> Result<(), NetError> {
    let invalid = |reason: String| NetError::InvalidProxy(proxy_url.to_string(), reason);
    let parsed = url::Url::parse(proxy_url).map_err(|e| invalid(e.to_string()))?;
    if !PROXY_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
    }
    Ok(())
}
