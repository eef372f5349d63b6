//! Saga error taxonomy.

use thiserror::Error;

use lexlink_core::{CanonicalizationError, IpId, OrderId, ValidationError};
use lexlink_state::PaymentMode;
use lexlink_store::StoreError;

use crate::capability::CapabilityError;
use crate::mint::MintError;

/// A fatal finalization or recording error.
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("IP asset {0} not found")]
    IpNotFound(IpId),

    /// A `btc` order was submitted for finalization without a txid.
    #[error("order {0} has no payment proof")]
    MissingPaymentProof(OrderId),

    #[error("order {order_id} is paid by {expected}, proof is {actual}")]
    PaymentModeMismatch {
        order_id: OrderId,
        expected: PaymentMode,
        actual: PaymentMode,
    },

    /// The `ckbtc` escrow subaccount holds less than the order price.
    #[error("order {order_id} escrow holds {received} sats, {required} required")]
    Unfunded {
        order_id: OrderId,
        required: u64,
        received: u64,
    },

    #[error("payment verification failed: {0}")]
    Payment(#[source] CapabilityError),

    #[error("ledger balance query failed: {0}")]
    Ledger(#[source] CapabilityError),

    #[error("attestation fetch failed: {0}")]
    Attestation(#[source] CapabilityError),

    #[error(transparent)]
    Mint(#[from] MintError),

    #[error("media fetch failed: {0}")]
    Media(#[source] CapabilityError),

    #[error("archive build failed: {0}")]
    Archive(#[source] CapabilityError),

    #[error("credential issuance failed: {0}")]
    Credential(#[source] CapabilityError),

    #[error("evidence canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FinalizeError {
    /// The saga step that failed, for audit payloads and metrics labels.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Validation(_)
            | Self::OrderNotFound(_)
            | Self::IpNotFound(_)
            | Self::MissingPaymentProof(_)
            | Self::PaymentModeMismatch { .. }
            | Self::Unfunded { .. } => "precondition",
            Self::Payment(_) | Self::Ledger(_) => "payment",
            Self::Attestation(_) => "attestation",
            Self::Mint(_) => "mint",
            Self::Media(_) => "media",
            Self::Archive(_) => "archive",
            Self::Credential(_) => "credential",
            Self::Canonicalization(_) => "evidence",
            Self::Store(_) => "store",
        }
    }
}
