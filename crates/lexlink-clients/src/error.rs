//! Client construction errors.
//!
//! Failures of individual calls are reported as
//! [`lexlink_finalize::CapabilityError`] or [`lexlink_finalize::MintError`];
//! this type only covers building the clients.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client for {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
}
