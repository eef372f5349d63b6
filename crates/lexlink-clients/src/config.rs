//! Capability client configuration.
//!
//! Every remote capability has its own optional base URL. A capability
//! without a URL is wired to a stand-in that reports `NotConfigured`
//! (or, for anchoring, skips), so a partially configured deployment still
//! starts and fails only the steps it cannot perform.

use url::Url;

/// Base URLs and credentials for the capability services.
///
/// Custom `Debug` redacts `api_token`.
#[derive(Clone, Default)]
pub struct ClientsConfig {
    /// Native-chain payment confirmation.
    pub payments_url: Option<Url>,
    /// Attestation documents.
    pub attestation_url: Option<Url>,
    /// IP registry (license minting).
    pub registry_url: Option<Url>,
    /// Bitcoin-backed token ledger gateway.
    pub ledger_url: Option<Url>,
    /// Esplora-compatible block explorer.
    pub explorer_url: Option<Url>,
    /// Evidence anchoring ledger. Unset disables anchoring.
    pub anchor_url: Option<Url>,
    /// Content-addressed storage for evidence archives.
    pub storage_url: Option<Url>,
    /// HTTP gateway that serves `ipfs://` media as `{gateway}/ipfs/{cid}/...`.
    pub ipfs_gateway_url: Option<Url>,
    /// Bearer token sent to every capability service.
    pub api_token: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ClientsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientsConfig")
            .field("payments_url", &self.payments_url)
            .field("attestation_url", &self.attestation_url)
            .field("registry_url", &self.registry_url)
            .field("ledger_url", &self.ledger_url)
            .field("explorer_url", &self.explorer_url)
            .field("anchor_url", &self.anchor_url)
            .field("storage_url", &self.storage_url)
            .field("ipfs_gateway_url", &self.ipfs_gateway_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl ClientsConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `LEXLINK_PAYMENTS_URL`, `LEXLINK_ATTESTATION_URL`,
    ///   `LEXLINK_REGISTRY_URL`, `LEXLINK_LEDGER_URL`,
    ///   `LEXLINK_EXPLORER_URL`, `LEXLINK_ANCHOR_URL`, `LEXLINK_STORAGE_URL`,
    ///   `LEXLINK_IPFS_GATEWAY_URL` (all optional)
    /// - `LEXLINK_CLIENT_TOKEN` (default: empty, no auth header)
    /// - `LEXLINK_CLIENT_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = |var: &str| -> Result<Option<Url>, ConfigError> {
            match lookup(var).filter(|s| !s.trim().is_empty()) {
                Some(raw) => parse_url(var, &raw).map(Some),
                None => Ok(None),
            }
        };
        let timeout_secs = match lookup("LEXLINK_CLIENT_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }

        Ok(Self {
            payments_url: url("LEXLINK_PAYMENTS_URL")?,
            attestation_url: url("LEXLINK_ATTESTATION_URL")?,
            registry_url: url("LEXLINK_REGISTRY_URL")?,
            ledger_url: url("LEXLINK_LEDGER_URL")?,
            explorer_url: url("LEXLINK_EXPLORER_URL")?,
            anchor_url: url("LEXLINK_ANCHOR_URL")?,
            storage_url: url("LEXLINK_STORAGE_URL")?,
            ipfs_gateway_url: url("LEXLINK_IPFS_GATEWAY_URL")?,
            api_token: lookup("LEXLINK_CLIENT_TOKEN").unwrap_or_default(),
            timeout_secs,
        })
    }

    /// Every service pointed at one base URL (for tests and local stacks).
    pub fn single_host(base: &str, token: &str) -> Result<Self, ConfigError> {
        let url = parse_url("base", base)?;
        Ok(Self {
            payments_url: Some(url.clone()),
            attestation_url: Some(url.clone()),
            registry_url: Some(url.clone()),
            ledger_url: Some(url.clone()),
            explorer_url: Some(url.clone()),
            anchor_url: Some(url.clone()),
            storage_url: Some(url.clone()),
            ipfs_gateway_url: Some(url),
            api_token: token.to_string(),
            timeout_secs: 5,
        })
    }
}

pub fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid client timeout '{0}': expected a positive number of seconds")]
    InvalidTimeout(String),
    #[error("client token contains characters not allowed in an HTTP header")]
    InvalidToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_leaves_everything_unset() {
        let cfg = ClientsConfig::from_lookup(lookup(&[])).unwrap();
        assert!(cfg.registry_url.is_none());
        assert!(cfg.anchor_url.is_none());
        assert!(cfg.ipfs_gateway_url.is_none());
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn reads_urls_and_timeout() {
        let cfg = ClientsConfig::from_lookup(lookup(&[
            ("LEXLINK_REGISTRY_URL", "https://registry.example.com/"),
            ("LEXLINK_ANCHOR_URL", "  "),
            ("LEXLINK_IPFS_GATEWAY_URL", "https://gateway.example.org"),
            ("LEXLINK_CLIENT_TIMEOUT_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.ipfs_gateway_url.unwrap().as_str(),
            "https://gateway.example.org/"
        );
        assert_eq!(
            cfg.registry_url.unwrap().as_str(),
            "https://registry.example.com/"
        );
        assert!(cfg.anchor_url.is_none());
        assert_eq!(cfg.timeout_secs, 12);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientsConfig::from_lookup(lookup(&[("LEXLINK_LEDGER_URL", "not a url")])),
            Err(ConfigError::InvalidUrl(..))
        ));
        assert!(matches!(
            ClientsConfig::from_lookup(lookup(&[("LEXLINK_CLIENT_TIMEOUT_SECS", "0")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = ClientsConfig::single_host("http://127.0.0.1:9000", "secret-token").unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
