//! # Ops Subcommand
//!
//! Operator actions against the configured deployment. Each one loads
//! [`AppConfig`] the same way the API server does (`LEXLINK_CONFIG` YAML
//! overlaid by the environment), so a config that passes `ops config`
//! here starts the server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use lexlink_api::config::{AppConfig, FileConfig};
use lexlink_api::state::{AppState, Services, Stores};
use lexlink_clients::ClientSet;
use lexlink_vc::{Ed25519KeyPair, LocalCredentialIssuer};

#[derive(Args, Debug)]
pub struct OpsArgs {
    /// YAML config file; overrides LEXLINK_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: OpsCommand,
}

#[derive(Subcommand, Debug)]
pub enum OpsCommand {
    /// Load and validate configuration, printing it with secrets redacted.
    Config,

    /// Run a single funding poll and print its summary as JSON.
    Poll,

    /// Walk the audit hash chain.
    AuditVerify {
        #[arg(long, default_value_t = 10_000)]
        limit: usize,
    },
}

pub fn run_ops(args: &OpsArgs) -> Result<u8> {
    let config = load_config(args.config.as_deref())?;
    match &args.command {
        OpsCommand::Config => {
            println!("OK: configuration valid");
            println!("{config:#?}");
            Ok(0)
        }
        OpsCommand::Poll => runtime()?.block_on(poll_once(&config)),
        OpsCommand::AuditVerify { limit } => runtime()?.block_on(audit_verify(&config, *limit)),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => config_from_file(path, |key| std::env::var(key).ok()),
        None => Ok(AppConfig::from_env()?),
    }
}

fn config_from_file(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
    let file = FileConfig::load(path)?;
    Ok(AppConfig::from_sources(env, file)?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

async fn poll_once(config: &AppConfig) -> Result<u8> {
    let stores = Stores::from_config(config)
        .await
        .context("database initialization failed")?;
    let key = match &config.signing_key_hex {
        Some(hex) => Ed25519KeyPair::from_seed_hex(hex).context("invalid LEXLINK_SIGNING_KEY_HEX")?,
        None => {
            tracing::warn!("LEXLINK_SIGNING_KEY_HEX not set, credentials signed with an ephemeral key");
            Ed25519KeyPair::generate()
        }
    };
    let clients = ClientSet::from_config(&config.clients).context("HTTP client setup failed")?;
    let services = Services::from_clients(&clients, Arc::new(LocalCredentialIssuer::new(key)));
    let state = AppState::new(stores, services, config);

    let summary = state.poller.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(if summary.count("error") == 0 { 0 } else { 1 })
}

async fn audit_verify(config: &AppConfig, limit: usize) -> Result<u8> {
    let stores = Stores::from_config(config)
        .await
        .context("database initialization failed")?;
    let integrity = stores.audit.verify_chain(limit.max(1)).await?;
    println!("{}", serde_json::to_string_pretty(&integrity)?);
    if integrity.chain_valid {
        println!("OK: {} events, chain intact", integrity.total_events);
        Ok(0)
    } else {
        println!("FAIL: {} broken links", integrity.broken_links);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_is_loaded_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexlink.yaml");
        std::fs::write(
            &path,
            "ckbtc_escrow_owner: file-owner\nport: 9001\nnetwork: mainnet\n",
        )
        .unwrap();
        let config = config_from_file(&path, |_| None).unwrap();
        assert_eq!(config.ckbtc_escrow_owner, "file-owner");
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexlink.yaml");
        std::fs::write(&path, "ckbtc_escrow_owner: file-owner\n").unwrap();
        let config = config_from_file(&path, |key| {
            (key == "LEXLINK_CKBTC_ESCROW_OWNER").then(|| "env-owner".to_string())
        })
        .unwrap();
        assert_eq!(config.ckbtc_escrow_owner, "env-owner");
    }

    #[test]
    fn unknown_config_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexlink.yaml");
        std::fs::write(&path, "ckbtc_escrow_owner: x\nprot: 1\n").unwrap();
        assert!(config_from_file(&path, |_| None).is_err());
    }

    #[test]
    fn empty_memory_chain_verifies() {
        let config = AppConfig::default();
        let code = runtime()
            .unwrap()
            .block_on(audit_verify(&config, 10))
            .unwrap();
        assert_eq!(code, 0);
    }
}
