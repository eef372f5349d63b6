//! # lexlink-clients: Capability Clients
//!
//! HTTP implementations of the capability traits in
//! [`lexlink_finalize::capability`], plus the local evidence archive
//! builder.
//!
//! | Capability | Client | Endpoint |
//! |------------|--------|----------|
//! | payment confirmation | [`HttpPaymentVerifier`] | `POST /payments/confirm` |
//! | attestation | [`HttpAttestationSource`] | `GET /attestations/{order_id}` |
//! | minting | [`HttpLicenseMinter`] | `POST /licenses/mint` |
//! | ledger balance | [`HttpLedgerClient`] | `POST /ledger/balance` |
//! | address funding | [`EsploraExplorer`] | `GET /{net/}api/address/{addr}/utxo` |
//! | anchoring | [`HttpEvidenceAnchor`] | `POST /anchors` |
//! | archive upload | [`HttpContentStore`] | `POST /uploads?name=` |
//! | media | [`HttpMediaFetcher`] | the media URL, `ipfs://` via the gateway |
//!
//! Each service has its own base URL in [`ClientsConfig`]. All of them
//! share one `reqwest::Client` carrying the bearer token, except media,
//! which is fetched anonymously.
//!
//! Clients do not retry writes. Idempotent reads retry transport failures
//! a bounded number of times. Mint retry on nonce conflicts is the
//! orchestrator's job.

pub mod anchor;
pub mod archive;
pub mod attestation;
pub mod config;
pub mod error;
pub mod explorer;
pub(crate) mod http;
pub mod ledger;
pub mod media;
pub mod payments;
pub mod registry;
pub(crate) mod retry;
pub mod storage;
pub mod unconfigured;

use std::sync::Arc;

use url::Url;

use lexlink_finalize::{
    ArchiveBuilder, AttestationSource, BlockExplorer, Capabilities, ContentStore,
    CredentialIssuer, DisabledAnchor, EvidenceAnchor, LedgerClient, LicenseMinter, MediaFetcher,
    PaymentVerifier,
};

pub use anchor::HttpEvidenceAnchor;
pub use archive::ManifestArchiveBuilder;
pub use attestation::HttpAttestationSource;
pub use config::{ClientsConfig, ConfigError};
pub use error::ClientError;
pub use explorer::EsploraExplorer;
pub use ledger::HttpLedgerClient;
pub use media::HttpMediaFetcher;
pub use payments::HttpPaymentVerifier;
pub use registry::HttpLicenseMinter;
pub use storage::HttpContentStore;
pub use unconfigured::Unconfigured;

use crate::http::Service;

/// Every capability the saga and the poller need, except credentials.
#[derive(Clone)]
pub struct ClientSet {
    pub payment: Arc<dyn PaymentVerifier>,
    pub attestation: Arc<dyn AttestationSource>,
    pub minter: Arc<dyn LicenseMinter>,
    pub media: Arc<dyn MediaFetcher>,
    pub anchor: Arc<dyn EvidenceAnchor>,
    pub archive: Arc<dyn ArchiveBuilder>,
    pub content_store: Arc<dyn ContentStore>,
    pub ledger: Arc<dyn LedgerClient>,
    pub explorer: Arc<dyn BlockExplorer>,
}

impl ClientSet {
    /// Build clients from configuration. Unset URLs produce
    /// [`Unconfigured`] stand-ins, or [`DisabledAnchor`] for anchoring.
    pub fn from_config(config: &ClientsConfig) -> Result<Self, ClientError> {
        let http = http::build_client(config)?;
        let service = |url: &Url, name: &'static str| Service::new(http.clone(), url, name);

        let payment: Arc<dyn PaymentVerifier> = match &config.payments_url {
            Some(u) => Arc::new(HttpPaymentVerifier::new(service(u, "payments"))),
            None => unconfigured("payments"),
        };
        let attestation: Arc<dyn AttestationSource> = match &config.attestation_url {
            Some(u) => Arc::new(HttpAttestationSource::new(service(u, "attestation"))),
            None => unconfigured("attestation"),
        };
        let minter: Arc<dyn LicenseMinter> = match &config.registry_url {
            Some(u) => Arc::new(HttpLicenseMinter::new(service(u, "registry"))),
            None => unconfigured("registry"),
        };
        let anchor: Arc<dyn EvidenceAnchor> = match &config.anchor_url {
            Some(u) => Arc::new(HttpEvidenceAnchor::new(service(u, "anchor"))),
            None => {
                tracing::warn!("evidence anchoring disabled");
                Arc::new(DisabledAnchor)
            }
        };
        let content_store: Arc<dyn ContentStore> = match &config.storage_url {
            Some(u) => Arc::new(HttpContentStore::new(service(u, "storage"))),
            None => unconfigured("storage"),
        };
        let ledger: Arc<dyn LedgerClient> = match &config.ledger_url {
            Some(u) => Arc::new(HttpLedgerClient::new(service(u, "ledger"))),
            None => unconfigured("ledger"),
        };
        let explorer: Arc<dyn BlockExplorer> = match &config.explorer_url {
            Some(u) => Arc::new(EsploraExplorer::new(service(u, "explorer"))),
            None => unconfigured("explorer"),
        };

        let set = Self {
            payment,
            attestation,
            minter,
            media: Arc::new(
                HttpMediaFetcher::new(config.timeout_secs)?
                    .with_ipfs_gateway(config.ipfs_gateway_url.clone()),
            ),
            anchor,
            archive: Arc::new(ManifestArchiveBuilder),
            content_store,
            ledger,
            explorer,
        };
        Ok(set)
    }

    /// The saga's capabilities, completed with a credential issuer.
    pub fn capabilities(&self, credentials: Arc<dyn CredentialIssuer>) -> Capabilities {
        Capabilities {
            payment: self.payment.clone(),
            ledger: self.ledger.clone(),
            attestation: self.attestation.clone(),
            minter: self.minter.clone(),
            media: self.media.clone(),
            anchor: self.anchor.clone(),
            archive: self.archive.clone(),
            content_store: self.content_store.clone(),
            credentials,
        }
    }
}

fn unconfigured(name: &'static str) -> Arc<Unconfigured> {
    tracing::warn!(capability = name, "capability not configured");
    Arc::new(Unconfigured(name))
}
