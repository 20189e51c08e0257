//! Mapping HTTP outcomes onto source failures
//!
//! - 404 → NotFound
//! - 429 → RateLimited
//! - 401, 403 and 5xx → Unreachable
//! - Any other non-success status → Malformed
//! - Transport timeouts → Timeout, connect errors → Unreachable
//! - Undecodable bodies → Malformed

use astra_core::Failure;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Failure for a non-success status, `None` on 2xx
    pub fn failure(&self) -> Option<Failure> {
        classify_status(self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        parse_json(&self.body)
    }
}

/// Classify a status code; `None` means success
pub fn classify_status(status: u16) -> Option<Failure> {
    let detail = format!("HTTP {}", status);
    match status {
        200..=299 => None,
        404 => Some(Failure::not_found(detail)),
        429 => Some(Failure::rate_limited(detail)),
        401 | 403 | 500..=599 => Some(Failure::unreachable(detail)),
        _ => Some(Failure::malformed(detail)),
    }
}

/// Classify a transport-level error
pub fn classify_error(error: &reqwest::Error) -> Failure {
    if error.is_timeout() {
        Failure::timeout(error.to_string())
    } else if error.is_decode() || error.is_body() {
        Failure::malformed(error.to_string())
    } else if let Some(status) = error.status() {
        classify_status(status.as_u16()).unwrap_or_else(|| Failure::malformed(error.to_string()))
    } else {
        Failure::unreachable(error.to_string())
    }
}

/// Decode a JSON body into a typed struct
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, Failure> {
    serde_json::from_str(body).map_err(|e| Failure::malformed(format!("invalid JSON: {}", e)))
}

/// Send a request and read the full body
///
/// Non-success statuses are returned as-is so each adapter can decide what
/// they mean; only transport errors become failures here.
pub async fn send(request: RequestBuilder) -> Result<RawResponse, Failure> {
    let response = request.send().await.map_err(|e| classify_error(&e))?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| classify_error(&e))?;

    debug!("HTTP {} ({} bytes)", status, body.len());
    Ok(RawResponse { status, body })
}

/// Send a request and decode a 2xx JSON body
pub async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, Failure> {
    let response = send(request).await?;
    if let Some(failure) = response.failure() {
        return Err(failure);
    }
    response.json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::FailureKind;
    use serde::Deserialize;

    fn kind(status: u16) -> Option<FailureKind> {
        classify_status(status).map(|f| f.kind)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(kind(200), None);
        assert_eq!(kind(204), None);
        assert_eq!(kind(404), Some(FailureKind::NotFound));
        assert_eq!(kind(429), Some(FailureKind::RateLimited));
        assert_eq!(kind(401), Some(FailureKind::Unreachable));
        assert_eq!(kind(403), Some(FailureKind::Unreachable));
        assert_eq!(kind(502), Some(FailureKind::Unreachable));
        assert_eq!(kind(400), Some(FailureKind::Malformed));
        assert_eq!(kind(302), Some(FailureKind::Malformed));
    }

    #[test]
    fn test_parse_json() {
        #[derive(Deserialize)]
        struct Body {
            ok: bool,
        }

        let body: Body = parse_json(r#"{"ok": true}"#).unwrap();
        assert!(body.ok);

        let failure = parse_json::<Body>("<html>").err().unwrap();
        assert_eq!(failure.kind, FailureKind::Malformed);
    }

    #[test]
    fn test_raw_response() {
        let response = RawResponse::new(429, "slow down");
        assert!(!response.is_success());
        assert_eq!(response.failure().map(|f| f.kind), Some(FailureKind::RateLimited));
        assert!(RawResponse::new(200, "[]").failure().is_none());
    }
}
