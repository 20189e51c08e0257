//! Engine configuration
//!
//! One TOML file can carry all three sections:
//!
//! ```toml
//! [engine]
//! deadline_ms = 8000
//! source_timeout_ms = 5000
//!
//! [engine.retry]
//! retries = 1
//!
//! [sources]
//! disabled = ["whoisjsonapi"]
//!
//! [scoring]
//! high_above = 60
//! ```
//!
//! With retries enabled each attempt gets its own HTTP timeout. Unless
//! `attempt_timeout_ms` is set, that is the per-source budget minus the
//! worst-case backoff, split evenly across attempts.

use astra_core::{PolicyError, ScoringPolicy};
use astra_net::NetError;
use astra_sources::{ConfigError, RetryPolicy, SourcesConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from building an engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid scoring policy: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error("Invalid engine setting: {0}")]
    Invalid(String),
}

/// Timing and retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overall request deadline
    pub deadline_ms: u64,
    /// Per-source timeout, covering every attempt
    pub source_timeout_ms: u64,
    /// HTTP timeout of a single attempt; derived from the retry policy when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 8_000,
            source_timeout_ms: 5_000,
            attempt_timeout_ms: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    /// Timeout handed to the HTTP client for one attempt
    pub fn attempt_timeout(&self) -> Duration {
        if let Some(ms) = self.attempt_timeout_ms {
            return Duration::from_millis(ms);
        }
        if self.retry.retries == 0 {
            return self.source_timeout();
        }
        let attempts = self.retry.retries.saturating_add(1);
        self.source_timeout().saturating_sub(self.retry.max_total_backoff()) / attempts
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.deadline_ms == 0 {
            return Err(EngineError::Invalid("deadline_ms must be positive".to_string()));
        }
        if self.source_timeout_ms == 0 {
            return Err(EngineError::Invalid(
                "source_timeout_ms must be positive".to_string(),
            ));
        }

        let attempt = self.attempt_timeout();
        if attempt.is_zero() {
            return Err(EngineError::Invalid(format!(
                "attempt timeout is zero; source_timeout_ms ({}) cannot fit {} retries",
                self.source_timeout_ms, self.retry.retries
            )));
        }
        if self.retry.retries > 0 && attempt + self.retry.backoff(0) >= self.source_timeout() {
            return Err(EngineError::Invalid(format!(
                "attempt timeout ({}ms) leaves no room for a retry within source_timeout_ms ({})",
                attempt.as_millis(),
                self.source_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Everything an engine needs, loadable from one TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AstraConfig {
    pub engine: EngineConfig,
    pub sources: SourcesConfig,
    pub scoring: ScoringPolicy,
}

impl AstraConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(raw).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.engine.validate()?;
        self.scoring.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::RiskFactor;

    #[test]
    fn test_defaults() {
        let config = AstraConfig::default();
        assert_eq!(config.engine.deadline(), Duration::from_secs(8));
        assert_eq!(config.engine.source_timeout(), Duration::from_secs(5));
        assert_eq!(config.engine.retry.retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_file() {
        let config = AstraConfig::from_toml_str(
            r#"
            [engine]
            deadline_ms = 3000

            [engine.retry]
            retries = 2

            [sources]
            disabled = ["crtsh"]

            [scoring]
            medium_above = 25

            [scoring.factors.camera_fingerprint]
            weight = 20
            recommendation = "Camera model identified"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.deadline_ms, 3000);
        assert_eq!(config.engine.source_timeout_ms, 5000);
        assert_eq!(config.engine.retry.retries, 2);
        assert!(!config.sources.is_enabled("crtsh"));
        assert_eq!(config.scoring.medium_above, 25);
        assert_eq!(config.scoring.factor(RiskFactor::CameraFingerprint).weight, 20);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let result = AstraConfig::from_toml_str("[scoring]\nhigh_above = 10\nmedium_above = 50\n");
        assert!(matches!(result, Err(EngineError::Policy(_))));
    }

    #[test]
    fn test_attempt_timeout_leaves_room_for_retries() {
        let single = EngineConfig::default();
        assert_eq!(single.attempt_timeout(), single.source_timeout());

        let config = EngineConfig {
            retry: RetryPolicy::default().with_retries(2),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());

        let attempts = config.retry.retries + 1;
        let worst_case = config.attempt_timeout() * attempts + config.retry.max_total_backoff();
        assert!(config.attempt_timeout() < config.source_timeout());
        assert!(worst_case <= config.source_timeout());
    }

    #[test]
    fn test_rejects_attempt_timeout_without_room() {
        let explicit = AstraConfig::from_toml_str(
            "[engine]\nsource_timeout_ms = 1000\nattempt_timeout_ms = 1000\n\n[engine.retry]\nretries = 1\n",
        );
        assert!(matches!(explicit, Err(EngineError::Invalid(_))));

        let starved = EngineConfig {
            source_timeout_ms: 10,
            retry: RetryPolicy::default().with_retries(3),
            ..EngineConfig::default()
        };
        assert!(matches!(starved.validate(), Err(EngineError::Invalid(_))));

        let fits = AstraConfig::from_toml_str(
            "[engine]\nsource_timeout_ms = 3000\nattempt_timeout_ms = 1000\n\n[engine.retry]\nretries = 1\n",
        )
        .unwrap();
        assert_eq!(fits.engine.attempt_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_zero_deadline() {
        let result = AstraConfig::from_toml_str("[engine]\ndeadline_ms = 0\n");
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }
}
