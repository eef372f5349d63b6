//! # External Capabilities
//!
//! The saga talks to the outside world only through these traits. Each one
//! is `async`, `Send + Sync`, and held as `Arc<dyn _>` so HTTP clients,
//! local implementations and test fakes are interchangeable.
//!
//! Wire formats are the implementor's business. The orchestrator only sees
//! the request/response types below and [`CapabilityError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lexlink_core::{EvmAddress, IpId, OrderId};
use lexlink_state::{AnchorOutcome, Network, Subaccount};

use crate::mint::MintError;

/// Failure of an external call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("{capability}: transport error: {message}")]
    Transport {
        capability: &'static str,
        message: String,
    },

    /// The service answered with a non-2xx status.
    #[error("{capability}: HTTP {status}: {body}")]
    Status {
        capability: &'static str,
        status: u16,
        body: String,
    },

    /// The response could not be decoded.
    #[error("{capability}: invalid response: {message}")]
    InvalidResponse {
        capability: &'static str,
        message: String,
    },

    /// No endpoint is configured for this capability.
    #[error("{0}: not configured")]
    NotConfigured(&'static str),

    /// The service understood the request and refused it.
    #[error("{capability}: rejected: {message}")]
    Rejected {
        capability: &'static str,
        message: String,
    },
}

// ── Payment ──────────────────────────────────────────────────────────

/// Confirms that a native-chain payment for an order is final.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn confirm_payment(
        &self,
        order_id: &OrderId,
        tx_reference: &str,
    ) -> Result<(), CapabilityError>;
}

/// A ledger account: owner plus 32-byte subaccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub owner: String,
    pub subaccount: Subaccount,
}

/// Balance queries against the Bitcoin-backed token ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balance in satoshis.
    async fn balance_of(&self, account: &LedgerAccount) -> Result<u64, CapabilityError>;
}

/// What a block explorer knows about payments to an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFunding {
    pub received_sats: u64,
    /// Confirmations of the funding transaction; 0 while in the mempool.
    pub confirmations: u32,
    pub tx_id: Option<String>,
}

#[async_trait]
pub trait BlockExplorer: Send + Sync {
    async fn address_funding(
        &self,
        address: &str,
        network: Network,
    ) -> Result<AddressFunding, CapabilityError>;
}

// ── Attestation, minting, media ─────────────────────────────────────

/// Returns the attestation document for an order as JSON text.
#[async_trait]
pub trait AttestationSource: Send + Sync {
    async fn fetch_attestation(&self, order_id: &OrderId) -> Result<String, CapabilityError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub ip_id: IpId,
    pub license_terms_id: String,
    pub receiver: EvmAddress,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub token_ids: Vec<String>,
    pub tx_hash: Option<String>,
}

/// Mints license tokens on the IP registry chain.
#[async_trait]
pub trait LicenseMinter: Send + Sync {
    async fn mint_license_token(&self, request: &MintRequest) -> Result<MintReceipt, MintError>;
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, CapabilityError>;
}

// ── Evidence ─────────────────────────────────────────────────────────

/// Publishes evidence hashes to the anchoring ledger.
///
/// Implementations report "disabled" as [`AnchorOutcome::Skipped`]. An
/// `Err` is recorded by the caller as [`AnchorOutcome::Failed`].
#[async_trait]
pub trait EvidenceAnchor: Send + Sync {
    async fn publish_evidence(
        &self,
        evidence_hash: &str,
        payload: &serde_json::Value,
    ) -> Result<AnchorOutcome, CapabilityError>;
}

/// Everything that goes into the downloadable evidence archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveInput {
    pub order_id: OrderId,
    pub ip_id: IpId,
    pub media: Vec<u8>,
    pub media_url: String,
    pub proof_fields: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArchive {
    pub bytes: Vec<u8>,
    pub archive_hash: String,
    pub file_name: String,
}

#[async_trait]
pub trait ArchiveBuilder: Send + Sync {
    async fn build_archive(&self, input: &ArchiveInput) -> Result<BuiltArchive, CapabilityError>;
}

/// Content-addressed storage for archives.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Upload and return the content URI.
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, CapabilityError>;
}

/// Facts bound into the license credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    /// `did:pkh` identifier of the receiver.
    pub subject_id: String,
    pub order_id: OrderId,
    pub ip_id: IpId,
    pub token_id: String,
    pub payment_reference: String,
    pub content_hash: String,
    pub evidence_hash: String,
    pub attestation_hash: String,
    pub archive_hash: String,
}

impl CredentialRequest {
    /// `did:pkh:eip155:1:<address>` for an EVM receiver.
    pub fn subject_for(receiver: &EvmAddress) -> String {
        format!("did:pkh:eip155:1:{receiver}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub document: serde_json::Value,
    /// SHA-256 of the canonical document, proof included.
    pub hash: String,
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<IssuedCredential, CapabilityError>;
}

/// An anchor for deployments without an anchoring ledger.
#[derive(Debug, Clone, Default)]
pub struct DisabledAnchor;

#[async_trait]
impl EvidenceAnchor for DisabledAnchor {
    async fn publish_evidence(
        &self,
        _evidence_hash: &str,
        _payload: &serde_json::Value,
    ) -> Result<AnchorOutcome, CapabilityError> {
        Ok(AnchorOutcome::Skipped {
            reason: "anchoring disabled".to_string(),
        })
    }
}
