//! Tunables for the saga and the poller.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::mint::MintPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid finalize config: {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

/// Saga and poller settings. Deserializable so it can sit inside the
/// service's YAML overlay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    /// Total mint calls per saga, first attempt included.
    pub mint_max_attempts: u32,
    /// Backoff after the first nonce conflict, in milliseconds.
    pub mint_backoff_base_ms: u64,
    /// Orders processed in parallel by one poll run.
    pub poll_concurrency: usize,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            mint_max_attempts: 3,
            mint_backoff_base_ms: 1_000,
            poll_concurrency: 8,
        }
    }
}

impl FinalizeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.mint_max_attempts) {
            return Err(ConfigError {
                field: "mint_max_attempts",
                reason: "must be between 1 and 10".into(),
            });
        }
        if self.mint_backoff_base_ms > 60_000 {
            return Err(ConfigError {
                field: "mint_backoff_base_ms",
                reason: "must not exceed 60000".into(),
            });
        }
        if self.poll_concurrency == 0 {
            return Err(ConfigError {
                field: "poll_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn mint_policy(&self) -> MintPolicy {
        MintPolicy {
            max_attempts: self.mint_max_attempts,
            backoff_base: Duration::from_millis(self.mint_backoff_base_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = FinalizeConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.mint_policy(), MintPolicy::default());
    }

    #[test]
    fn zero_attempts_rejected() {
        let cfg = FinalizeConfig {
            mint_max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate().unwrap_err().field, "mint_max_attempts");
    }

    #[test]
    fn zero_concurrency_rejected() {
        let cfg = FinalizeConfig {
            poll_concurrency: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
