//! # lexlink-api: Binary Entry Point
//!
//! Loads [`AppConfig`], picks the store (Postgres when `DATABASE_URL` is
//! set, in-memory otherwise), builds the HTTP clients and the credential
//! issuer, installs the Prometheus recorder, optionally starts the
//! background poller, and serves until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

use lexlink_api::auth::AuthConfig;
use lexlink_api::config::AppConfig;
use lexlink_api::state::{AppState, Services, Stores};
use lexlink_clients::ClientSet;
use lexlink_vc::{Ed25519KeyPair, LocalCredentialIssuer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "configuration loaded");

    let stores = Stores::from_config(&config)
        .await
        .context("database initialization failed")?;

    let signing_key = match &config.signing_key_hex {
        Some(hex) => Ed25519KeyPair::from_seed_hex(hex).context("invalid LEXLINK_SIGNING_KEY_HEX")?,
        None => {
            tracing::warn!("LEXLINK_SIGNING_KEY_HEX not set, credentials signed with an ephemeral key");
            Ed25519KeyPair::generate()
        }
    };
    let issuer = LocalCredentialIssuer::new(signing_key);
    tracing::info!(issuer = issuer.issuer(), "credential issuer ready");

    let clients = ClientSet::from_config(&config.clients).context("HTTP client setup failed")?;
    let services = Services::from_clients(&clients, Arc::new(issuer));

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let state = AppState::new(stores, services, &config).with_metrics(prometheus);

    if config.poll_interval_secs > 0 {
        lexlink_api::worker::spawn_poll_loop(
            state.poller.clone(),
            Duration::from_secs(config.poll_interval_secs),
        );
        tracing::info!(every_secs = config.poll_interval_secs, "background funding poller started");
    }

    let app = lexlink_api::app(
        state,
        AuthConfig {
            token: config.auth_token.clone(),
        },
    );
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, every request runs as the operator");
    }

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("LexLink API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shut down");
    Ok(())
}

/// `EnvFilter` from `RUST_LOG` (default `info`); JSON lines when
/// `LEXLINK_LOG_JSON` is truthy.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LEXLINK_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
