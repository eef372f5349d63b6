//! # Service Configuration
//!
//! [`AppConfig`] is assembled once at startup from two sources:
//!
//! 1. An optional YAML file named by `LEXLINK_CONFIG`.
//! 2. Environment variables, which override the file key by key.
//!
//! The result is validated before anything is built from it.
//!
//! | Variable | YAML key | Default |
//! |----------|----------|---------|
//! | `PORT` | `port` | 8080 |
//! | `AUTH_TOKEN` | `auth_token` | unset (auth disabled) |
//! | `DATABASE_URL` | `database_url` | unset (in-memory store) |
//! | `LEXLINK_DB_MAX_CONNECTIONS` | `db_max_connections` | 10 |
//! | `LEXLINK_LOCK_TTL_SECS` | `lock_ttl_secs` | 900 |
//! | `LEXLINK_NETWORK` | `network` | testnet |
//! | `LEXLINK_CKBTC_ESCROW_OWNER` | `ckbtc_escrow_owner` | required |
//! | `LEXLINK_SIGNING_KEY_HEX` | `signing_key_hex` | unset (ephemeral key) |
//! | `LEXLINK_POLL_INTERVAL_SECS` | `poll_interval_secs` | 0 (no background poller) |
//! | `LEXLINK_MINT_MAX_ATTEMPTS` | `finalize.mint_max_attempts` | 3 |
//! | `LEXLINK_MINT_BACKOFF_BASE_MS` | `finalize.mint_backoff_base_ms` | 1000 |
//! | `LEXLINK_POLL_CONCURRENCY` | `finalize.poll_concurrency` | 8 |
//! | `LEXLINK_IPFS_GATEWAY_URL` | `clients.ipfs_gateway_url` | unset (`ipfs://` media refused) |
//! | `LEXLINK_*_URL`, `LEXLINK_CLIENT_*` | `clients.*` | see `lexlink_clients::ClientsConfig` |

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use lexlink_clients::ClientsConfig;
use lexlink_finalize::FinalizeConfig;
use lexlink_state::Network;
use lexlink_store::DEFAULT_LOCK_TTL_SECS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error(transparent)]
    Clients(#[from] lexlink_clients::ConfigError),

    #[error(transparent)]
    Finalize(#[from] lexlink_finalize::ConfigError),
}

/// Contents of the YAML overlay. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub auth_token: Option<String>,
    pub database_url: Option<String>,
    pub db_max_connections: Option<u32>,
    pub lock_ttl_secs: Option<u64>,
    pub network: Option<String>,
    pub ckbtc_escrow_owner: Option<String>,
    pub signing_key_hex: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub finalize: Option<FinalizeConfig>,
    /// Client settings keyed without the `LEXLINK_` prefix, lowercase
    /// (`registry_url`, `client_token`, `client_timeout_secs`, ...).
    pub clients: HashMap<String, String>,
}

impl FileConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&text)
    }

    /// The file's value for a `LEXLINK_*` client variable.
    fn client_var(&self, var: &str) -> Option<String> {
        let key = var.strip_prefix("LEXLINK_")?.to_ascii_lowercase();
        self.clients.get(&key).cloned()
    }
}

/// Validated service configuration.
///
/// Custom `Debug` redacts the auth token, database URL and signing key.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication.
    pub auth_token: Option<String>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub lock_ttl_secs: u64,
    /// Network for orders that do not name one.
    pub network: Network,
    /// Ledger account that owns every `ckbtc` escrow subaccount.
    pub ckbtc_escrow_owner: String,
    /// Hex seed of the credential signing key.
    pub signing_key_hex: Option<String>,
    /// Seconds between background funding polls; 0 disables the loop.
    pub poll_interval_secs: u64,
    pub finalize: FinalizeConfig,
    pub clients: ClientsConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("db_max_connections", &self.db_max_connections)
            .field("lock_ttl_secs", &self.lock_ttl_secs)
            .field("network", &self.network)
            .field("ckbtc_escrow_owner", &self.ckbtc_escrow_owner)
            .field("signing_key_hex", &self.signing_key_hex.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("finalize", &self.finalize)
            .field("clients", &self.clients)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            db_max_connections: 10,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            network: Network::Testnet,
            ckbtc_escrow_owner: "lexlink-escrow".to_string(),
            signing_key_hex: None,
            poll_interval_secs: 0,
            finalize: FinalizeConfig::default(),
            clients: ClientsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `LEXLINK_CONFIG` (if set) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("LEXLINK_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Some(FileConfig::load(Path::new(path.trim()))?),
            _ => None,
        };
        Self::from_sources(|key| std::env::var(key).ok(), file.unwrap_or_default())
    }

    /// Merge `file` with `env`; environment values win.
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        file: FileConfig,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let mut finalize = file.finalize.clone().unwrap_or_default();
        if let Some(v) = env("LEXLINK_MINT_MAX_ATTEMPTS") {
            finalize.mint_max_attempts = parse("LEXLINK_MINT_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = env("LEXLINK_MINT_BACKOFF_BASE_MS") {
            finalize.mint_backoff_base_ms = parse("LEXLINK_MINT_BACKOFF_BASE_MS", &v)?;
        }
        if let Some(v) = env("LEXLINK_POLL_CONCURRENCY") {
            finalize.poll_concurrency = parse("LEXLINK_POLL_CONCURRENCY", &v)?;
        }
        finalize.validate()?;

        let clients = ClientsConfig::from_lookup(|var| env(var).or_else(|| file.client_var(var)))?;

        let config = Self {
            port: match env("PORT") {
                Some(v) => parse("PORT", &v)?,
                None => file.port.unwrap_or(defaults.port),
            },
            auth_token: env("AUTH_TOKEN").or(file.auth_token),
            database_url: env("DATABASE_URL").or(file.database_url),
            db_max_connections: match env("LEXLINK_DB_MAX_CONNECTIONS") {
                Some(v) => parse("LEXLINK_DB_MAX_CONNECTIONS", &v)?,
                None => file.db_max_connections.unwrap_or(defaults.db_max_connections),
            },
            lock_ttl_secs: match env("LEXLINK_LOCK_TTL_SECS") {
                Some(v) => parse("LEXLINK_LOCK_TTL_SECS", &v)?,
                None => file.lock_ttl_secs.unwrap_or(defaults.lock_ttl_secs),
            },
            network: match env("LEXLINK_NETWORK").or(file.network) {
                Some(v) => v.parse().map_err(|e: lexlink_core::ValidationError| {
                    ConfigError::Invalid {
                        field: "network",
                        reason: e.to_string(),
                    }
                })?,
                None => defaults.network,
            },
            ckbtc_escrow_owner: env("LEXLINK_CKBTC_ESCROW_OWNER")
                .or(file.ckbtc_escrow_owner)
                .ok_or(ConfigError::Missing("LEXLINK_CKBTC_ESCROW_OWNER"))?,
            signing_key_hex: env("LEXLINK_SIGNING_KEY_HEX").or(file.signing_key_hex),
            poll_interval_secs: match env("LEXLINK_POLL_INTERVAL_SECS") {
                Some(v) => parse("LEXLINK_POLL_INTERVAL_SECS", &v)?,
                None => file.poll_interval_secs.unwrap_or(defaults.poll_interval_secs),
            },
            finalize,
            clients,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "db_max_connections",
                reason: "must be at least 1".into(),
            });
        }
        if self.lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "lock_ttl_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.ckbtc_escrow_owner.trim().is_empty() {
            return Err(ConfigError::Missing("LEXLINK_CKBTC_ESCROW_OWNER"));
        }
        if let Some(token) = &self.auth_token {
            if token.contains(':') {
                return Err(ConfigError::Invalid {
                    field: "auth_token",
                    reason: "must not contain ':'".into(),
                });
            }
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("cannot parse '{raw}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |k| pairs.iter().find(|(key, _)| *key == k).map(|(_, v)| v.to_string())
    }

    #[test]
    fn escrow_owner_is_required() {
        let err = AppConfig::from_sources(env(&[]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LEXLINK_CKBTC_ESCROW_OWNER")));
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig::from_yaml_str(
            r#"
port: 9000
ckbtc_escrow_owner: file-owner
poll_interval_secs: 30
finalize:
  mint_max_attempts: 5
clients:
  registry_url: https://registry.example.com
  ipfs_gateway_url: https://ipfs.example.org
  client_timeout_secs: "10"
"#,
        )
        .unwrap();
        let cfg = AppConfig::from_sources(
            env(&[("PORT", "7000"), ("LEXLINK_MINT_BACKOFF_BASE_MS", "250")]),
            file,
        )
        .unwrap();

        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.ckbtc_escrow_owner, "file-owner");
        assert_eq!(cfg.poll_interval_secs, 30);
        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.finalize.mint_max_attempts, 5);
        assert_eq!(cfg.finalize.mint_backoff_base_ms, 250);
        assert_eq!(
            cfg.clients.registry_url.unwrap().as_str(),
            "https://registry.example.com/"
        );
        assert_eq!(cfg.clients.timeout_secs, 10);
        assert_eq!(
            cfg.clients.ipfs_gateway_url.unwrap().as_str(),
            "https://ipfs.example.org/"
        );
    }

    #[test]
    fn network_is_parsed() {
        let cfg = AppConfig::from_sources(
            env(&[("LEXLINK_CKBTC_ESCROW_OWNER", "o"), ("LEXLINK_NETWORK", "signet")]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(cfg.network, Network::Signet);

        let err = AppConfig::from_sources(
            env(&[("LEXLINK_CKBTC_ESCROW_OWNER", "o"), ("LEXLINK_NETWORK", "moon")]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "network", .. }));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(FileConfig::from_yaml_str("prot: 80\n").is_err());
    }

    #[test]
    fn bad_numbers_are_reported_by_field() {
        let err = AppConfig::from_sources(
            env(&[("LEXLINK_CKBTC_ESCROW_OWNER", "o"), ("PORT", "eighty")]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "PORT", .. }));
    }

    #[test]
    fn invalid_finalize_settings_fail_validation() {
        let err = AppConfig::from_sources(
            env(&[("LEXLINK_CKBTC_ESCROW_OWNER", "o"), ("LEXLINK_MINT_MAX_ATTEMPTS", "0")]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Finalize(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = AppConfig {
            auth_token: Some("s3cret".into()),
            database_url: Some("postgres://u:pw@db/lexlink".into()),
            ..AppConfig::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("pw@db"));
    }
}
