//! Investigation subjects
//!
//! A subject is the thing a lookup is about. Subjects are built once from
//! user input (or from a metadata bundle handed over by an analysis backend)
//! and are never mutated afterwards.
//!
//! Normalization rules:
//! - Domains: scheme, leading `www.`, path, port and trailing dot removed, lower-cased
//! - URLs: `https://` assumed when no scheme is given, scheme and host lower-cased
//! - Emails: trimmed and lower-cased

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::ExifBundle;

/// Errors from building a subject out of user input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("Empty input")]
    Empty,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Fieldless discriminant of [`Subject`], used by adapters to declare applicability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Email,
    Domain,
    Url,
    ImageMetadata,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 4] = [
        SubjectKind::Email,
        SubjectKind::Domain,
        SubjectKind::Url,
        SubjectKind::ImageMetadata,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Email => "email",
            SubjectKind::Domain => "domain",
            SubjectKind::Url => "url",
            SubjectKind::ImageMetadata => "image_metadata",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized URL together with its host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSubject {
    /// Full URL including scheme
    pub url: String,
    /// Lower-cased host name
    pub host: String,
}

/// The entity being investigated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Subject {
    Email(String),
    Domain(String),
    Url(UrlSubject),
    ImageMetadata(ExifBundle),
}

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").unwrap()
});

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").unwrap()
});

impl Subject {
    /// Build an email subject
    pub fn email(input: &str) -> Result<Self, SubjectError> {
        let address = input.trim().to_lowercase();
        if address.is_empty() {
            return Err(SubjectError::Empty);
        }
        if !EMAIL_REGEX.is_match(&address) {
            return Err(SubjectError::InvalidEmail(input.trim().to_string()));
        }
        Ok(Subject::Email(address))
    }

    /// Build a domain subject, stripping scheme, `www.` and any path
    pub fn domain(input: &str) -> Result<Self, SubjectError> {
        normalize_domain(input).map(Subject::Domain)
    }

    /// Build a URL subject, assuming `https://` when no scheme is given
    pub fn url(input: &str) -> Result<Self, SubjectError> {
        normalize_url(input).map(Subject::Url)
    }

    /// Wrap a metadata bundle extracted by an analysis backend
    pub fn image_metadata(bundle: ExifBundle) -> Self {
        Subject::ImageMetadata(bundle)
    }

    /// Guess the subject variant from free text
    pub fn detect(input: &str) -> Result<Self, SubjectError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SubjectError::Empty);
        }

        if trimmed.contains('@') && !trimmed.contains("://") {
            return Self::email(trimmed);
        }

        if trimmed.contains("://") || trimmed.contains('/') || trimmed.contains('?') {
            return Self::url(trimmed);
        }

        Self::domain(trimmed)
    }

    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Email(_) => SubjectKind::Email,
            Subject::Domain(_) => SubjectKind::Domain,
            Subject::Url(_) => SubjectKind::Url,
            Subject::ImageMetadata(_) => SubjectKind::ImageMetadata,
        }
    }

    /// Stable identity string used in reports and logs
    pub fn identifier(&self) -> String {
        match self {
            Subject::Email(address) => address.clone(),
            Subject::Domain(name) => name.clone(),
            Subject::Url(url) => {
                let stripped = url
                    .url
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(&url.url);
                stripped.trim_end_matches('/').to_string()
            }
            Subject::ImageMetadata(bundle) => bundle.identifier(),
        }
    }

    /// Host name the subject points at: the domain itself, a URL's host,
    /// or the mail domain of an email address
    pub fn host(&self) -> Option<&str> {
        match self {
            Subject::Email(address) => address.split_once('@').map(|(_, domain)| domain),
            Subject::Domain(name) => Some(name),
            Subject::Url(url) => Some(&url.host),
            Subject::ImageMetadata(_) => None,
        }
    }

    pub fn as_email(&self) -> Option<&str> {
        match self {
            Subject::Email(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Subject::Url(url) => Some(&url.url),
            _ => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&ExifBundle> {
        match self {
            Subject::ImageMetadata(bundle) => Some(bundle),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.identifier())
    }
}

fn normalize_domain(input: &str) -> Result<String, SubjectError> {
    let lower = input.trim().to_lowercase();
    if lower.is_empty() {
        return Err(SubjectError::Empty);
    }

    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);

    let host = without_www
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().trim_end_matches('.');

    if host.parse::<IpAddr>().is_ok() || DOMAIN_REGEX.is_match(host) {
        Ok(host.to_string())
    } else {
        Err(SubjectError::InvalidDomain(input.trim().to_string()))
    }
}

fn normalize_url(input: &str) -> Result<UrlSubject, SubjectError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SubjectError::Empty);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| SubjectError::InvalidUrl(format!("{} ({})", trimmed, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SubjectError::InvalidUrl(format!(
            "{} (unsupported scheme {})",
            trimmed,
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SubjectError::InvalidUrl(format!("{} (missing host)", trimmed)))?
        .trim_end_matches('.')
        .to_string();

    Ok(UrlSubject {
        url: parsed.to_string(),
        host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_normalization() {
        let subject = Subject::domain("HTTPS://www.Example.COM/path?q=1").unwrap();
        assert_eq!(subject, Subject::Domain("example.com".to_string()));
        assert_eq!(subject.identifier(), "example.com");

        let subject = Subject::domain("example.org:8080").unwrap();
        assert_eq!(subject.identifier(), "example.org");
    }

    #[test]
    fn test_invalid_domain() {
        assert!(matches!(
            Subject::domain("not a domain"),
            Err(SubjectError::InvalidDomain(_))
        ));
        assert_eq!(Subject::domain("   "), Err(SubjectError::Empty));
    }

    #[test]
    fn test_url_defaults_to_https() {
        let subject = Subject::url("Example.com/Login").unwrap();
        assert_eq!(subject.as_url(), Some("https://example.com/Login"));
        assert_eq!(subject.host(), Some("example.com"));
        assert_eq!(subject.identifier(), "example.com/Login");
    }

    #[test]
    fn test_url_rejects_other_schemes() {
        assert!(matches!(
            Subject::url("ftp://example.com/file"),
            Err(SubjectError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_email() {
        let subject = Subject::email("  Alice@Example.COM ").unwrap();
        assert_eq!(subject.identifier(), "alice@example.com");
        assert_eq!(subject.host(), Some("example.com"));
        assert!(Subject::email("alice@").is_err());
    }

    #[test]
    fn test_detect() {
        assert_eq!(Subject::detect("bob@mail.net").unwrap().kind(), SubjectKind::Email);
        assert_eq!(Subject::detect("http://x.io/a").unwrap().kind(), SubjectKind::Url);
        assert_eq!(Subject::detect("x.io/a").unwrap().kind(), SubjectKind::Url);
        assert_eq!(Subject::detect("x.io").unwrap().kind(), SubjectKind::Domain);
        assert_eq!(Subject::detect(""), Err(SubjectError::Empty));
    }
}
