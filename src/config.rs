//! Vault configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config.
//! Compute-layer calls have no deadline unless `compute_timeout_ms` is set.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ten days, the window the reference client requests.
pub const DEFAULT_TOKEN_VALIDITY_SECS: u64 = 10 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Validity window of tokens issued by `Vault::issue_token`.
    pub token_validity_secs: u64,
    /// Deadline for each compute-layer call.
    pub compute_timeout_ms: Option<u64>,
    /// Maximum title length in bytes.
    pub max_title_len: usize,
    /// Maximum secret length in bytes.
    pub max_secret_len: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            token_validity_secs: DEFAULT_TOKEN_VALIDITY_SECS,
            compute_timeout_ms: None,
            max_title_len: 256,
            max_secret_len: 4096,
        }
    }
}

impl VaultConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_validity_secs == 0 {
            return Err(ConfigError::Invalid("token_validity_secs must be non-zero"));
        }
        if self.compute_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("compute_timeout_ms must be non-zero"));
        }
        if self.max_title_len == 0 || self.max_secret_len == 0 {
            return Err(ConfigError::Invalid("length limits must be non-zero"));
        }
        Ok(())
    }

    pub fn token_validity(&self) -> Duration {
        Duration::from_secs(self.token_validity_secs)
    }

    pub fn compute_timeout(&self) -> Option<Duration> {
        self.compute_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = VaultConfig::from_json("{}").unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.token_validity(), Duration::from_secs(864_000));
        assert_eq!(config.compute_timeout(), None);
    }

    #[test]
    fn test_partial_override() {
        let config = VaultConfig::from_json(r#"{"compute_timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.compute_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.max_secret_len, 4096);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            VaultConfig::from_json(r#"{"token_validity_secs": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            VaultConfig::from_json(r#"{"max_title_len": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(VaultConfig::from_json("not json"), Err(ConfigError::Parse(_))));
    }
}
