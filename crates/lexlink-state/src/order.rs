//! # License Order Lifecycle
//!
//! A license order tracks one buyer's request to license one IP asset
//! through payment detection, the finalization saga and its outcome.
//!
//! ## States
//!
//! ```text
//! pending ──▶ funded ──▶ confirmed ──▶ finalizing ──▶ finalized
//!    │           │                      ▲    │
//!    └───────────┴──────────────────────┘    ▼
//!                                 failed ──▶ finalizing (retry)
//! ```
//!
//! Status only moves forward. The single backward edge is
//! `finalizing → failed`, and `failed` always admits a fresh lock.
//!
//! ## Mutual Exclusion
//!
//! [`LicenseOrder::try_lock`] is the check-and-set behind the store's
//! `request_finalization`. It proceeds only when the order is neither
//! `finalizing` nor `finalized`, or when a `finalizing` lock has outlived
//! its TTL (a crashed finalizer). Stores must run it inside one atomic
//! critical section.
//!
//! A granted lock carries the `finalizing_since` instant it set. `complete`
//! and `fail` only apply while the order still holds that exact instant, so
//! a saga whose lock was reclaimed can no longer write to the order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lexlink_core::{EvmAddress, IpId, OrderId, Principal, ValidationError};

use crate::network::Network;
use crate::subaccount::Subaccount;

// ── Status ───────────────────────────────────────────────────────────

/// Lifecycle status of a license order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created, no payment seen yet.
    Pending,
    /// Payment seen, not yet sufficiently confirmed.
    Funded,
    /// Payment confirmed, awaiting finalization.
    Confirmed,
    /// A finalization saga holds the lock.
    Finalizing,
    /// License minted and evidence recorded. Terminal.
    Finalized,
    /// The last finalization attempt failed; retryable.
    Failed,
}

impl OrderStatus {
    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Funded => "funded",
            Self::Confirmed => "confirmed",
            Self::Finalizing => "finalizing",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }

    /// Parse the canonical string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "funded" => Some(Self::Funded),
            "confirmed" => Some(Self::Confirmed),
            "finalizing" => Some(Self::Finalizing),
            "finalized" => Some(Self::Finalized),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses the funding poller inspects.
    pub const POLL_CANDIDATES: [OrderStatus; 3] = [Self::Pending, Self::Funded, Self::Confirmed];

    /// Statuses that reject a new finalization lock.
    pub const LOCKED: [OrderStatus; 2] = [Self::Finalizing, Self::Finalized];

    /// Whether the status belongs to the payment-detection phase.
    pub fn is_funding_phase(&self) -> bool {
        matches!(self, Self::Pending | Self::Funded | Self::Confirmed)
    }

    /// Whether `self → next` is an edge of the state machine.
    ///
    /// Same-status moves are not edges; callers treat them as field patches.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Funded)
                | (Pending, Confirmed)
                | (Funded, Confirmed)
                | (Pending | Funded | Confirmed | Failed, Finalizing)
                | (Finalizing, Finalized)
                | (Finalizing, Failed)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected status change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("order {order_id}: invalid transition from {from} to {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
    #[error("order {order_id}: funding update requires a funding-phase status, got {to}")]
    NotAFundingStatus { order_id: OrderId, to: OrderStatus },
    #[error("order {order_id}: finalization lock granted at {granted_at} is no longer held")]
    LockNotHeld {
        order_id: OrderId,
        granted_at: DateTime<Utc>,
    },
}

// ── Payment ──────────────────────────────────────────────────────────

/// How the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Native Bitcoin transaction to an escrow address.
    Btc,
    /// Bitcoin-backed ledger token transfer to an escrow subaccount.
    Ckbtc,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "btc",
            Self::Ckbtc => "ckbtc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "btc" => Some(Self::Btc),
            "ckbtc" => Some(Self::Ckbtc),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence that an order was paid. Exactly one arm applies per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PaymentProof {
    Btc {
        tx_id: String,
    },
    Ckbtc {
        subaccount: Subaccount,
        minted_amount: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_index: Option<u64>,
    },
}

impl PaymentProof {
    pub fn mode(&self) -> PaymentMode {
        match self {
            Self::Btc { .. } => PaymentMode::Btc,
            Self::Ckbtc { .. } => PaymentMode::Ckbtc,
        }
    }

    /// The reference recorded in evidence: the txid for `btc`, the ledger
    /// block index (or subaccount when unknown) for `ckbtc`.
    pub fn reference(&self) -> String {
        match self {
            Self::Btc { tx_id } => tx_id.clone(),
            Self::Ckbtc {
                block_index: Some(index),
                ..
            } => format!("ckbtc-block:{index}"),
            Self::Ckbtc { subaccount, .. } => format!("ckbtc-subaccount:{subaccount}"),
        }
    }
}

/// Where the buyer sends funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EscrowTarget {
    Btc { address: String },
    Ckbtc { owner: String, subaccount: Subaccount },
}

impl EscrowTarget {
    /// Text form shown to buyers: the address for `btc`,
    /// `owner.subaccounthex` for `ckbtc`.
    pub fn render(&self) -> String {
        match self {
            Self::Btc { address } => address.clone(),
            Self::Ckbtc { owner, subaccount } => format!("{owner}.{subaccount}"),
        }
    }
}

// ── Evidence ─────────────────────────────────────────────────────────

/// Result of publishing an evidence hash to the anchoring ledger.
///
/// The three outcomes are carried through to the stored record as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnchorOutcome {
    Ok {
        tx_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explorer_url: Option<String>,
    },
    Failed {
        message: String,
    },
    Skipped {
        reason: String,
    },
}

impl AnchorOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// `ok`, `failed` or `skipped`.
    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// The failure message or skip reason, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Failed { message } => Some(message),
            Self::Skipped { reason } => Some(reason),
        }
    }

    pub fn tx_ref(&self) -> Option<&str> {
        match self {
            Self::Ok { tx_ref, .. } => Some(tx_ref),
            _ => None,
        }
    }
}

/// Every artifact a successful finalization produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedEvidence {
    pub token_on_chain_id: String,
    pub attestation_hash: String,
    pub content_hash: String,
    pub evidence_hash: String,
    pub anchor: AnchorOutcome,
    pub archive_hash: String,
    /// Content-addressed URI; absent when the upload failed.
    pub archive_uri: Option<String>,
    pub archive_file_name: String,
    pub vc_document: serde_json::Value,
    pub vc_hash: String,
    pub compliance_score: u8,
    pub training_units: u64,
}

/// Fields written by `mark_completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletion {
    pub evidence: FinalizedEvidence,
    pub owner_principal: Option<Principal>,
    /// Replaces the stored proof when present (the `ckbtc` path learns
    /// the minted amount only at finalization).
    pub payment_proof: Option<PaymentProof>,
    pub completed_at: DateTime<Utc>,
    /// `FinalizationLock::granted_at` of the saga committing.
    pub lock_granted_at: DateTime<Utc>,
}

/// Result of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationLock {
    /// True iff this caller now holds the lock.
    pub proceed: bool,
    /// Status after the request (`finalizing` when `proceed`).
    pub status: OrderStatus,
    /// The stored `finalizing_since` of a granted lock.
    pub granted_at: Option<DateTime<Utc>>,
}

impl FinalizationLock {
    pub fn granted(at: DateTime<Utc>) -> Self {
        Self {
            proceed: true,
            status: OrderStatus::Finalizing,
            granted_at: Some(at),
        }
    }

    pub fn refused(status: OrderStatus) -> Self {
        Self {
            proceed: false,
            status,
            granted_at: None,
        }
    }
}

// ── Order ────────────────────────────────────────────────────────────

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub ip_id: IpId,
    pub buyer_principal: Option<Principal>,
    pub mint_to: EvmAddress,
    pub payment_mode: PaymentMode,
    /// Signed so that non-positive input reaches validation.
    pub amount_sats: i64,
    pub network: Network,
    /// Escrow address for `btc` orders; ignored for `ckbtc`.
    pub btc_address: Option<String>,
    pub owner_principal: Option<Principal>,
}

/// A license order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseOrder {
    pub order_id: OrderId,
    pub ip_id: IpId,
    pub buyer_principal: Option<Principal>,
    pub mint_to: EvmAddress,
    pub payment_mode: PaymentMode,
    pub amount_sats: u64,
    pub network: Network,
    pub escrow: EscrowTarget,
    pub ckbtc_subaccount: Subaccount,
    pub status: OrderStatus,
    pub confirmations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
    pub finalizing_since: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub payment_proof: Option<PaymentProof>,
    pub evidence: Option<FinalizedEvidence>,
    pub last_error: Option<String>,
    pub evidence_payload: Option<serde_json::Value>,
    pub owner_principal: Option<Principal>,
}

fn validate_btc_address(raw: &str) -> Result<String, ValidationError> {
    let addr = raw.trim();
    if !(14..=90).contains(&addr.len()) || !addr.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::field(
            "btc_address",
            "must be 14-90 alphanumeric characters",
        ));
    }
    Ok(addr.to_string())
}

impl LicenseOrder {
    /// Validate input and create an order in `pending`.
    ///
    /// `ckbtc_escrow_owner` is the ledger account that owns every escrow
    /// subaccount.
    pub fn new_pending(
        input: NewOrder,
        ckbtc_escrow_owner: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if input.amount_sats <= 0 {
            return Err(ValidationError::field(
                "amount_sats",
                "must be greater than zero",
            ));
        }
        let amount_sats = input.amount_sats as u64;
        let ckbtc_subaccount = Subaccount::derive(&input.order_id);
        let escrow = match input.payment_mode {
            PaymentMode::Btc => {
                let raw = input.btc_address.as_deref().ok_or_else(|| {
                    ValidationError::field("btc_address", "required for btc payment mode")
                })?;
                EscrowTarget::Btc {
                    address: validate_btc_address(raw)?,
                }
            }
            PaymentMode::Ckbtc => {
                if ckbtc_escrow_owner.trim().is_empty() {
                    return Err(ValidationError::field(
                        "payment_mode",
                        "ckbtc escrow owner is not configured",
                    ));
                }
                EscrowTarget::Ckbtc {
                    owner: ckbtc_escrow_owner.trim().to_string(),
                    subaccount: ckbtc_subaccount,
                }
            }
        };

        Ok(Self {
            order_id: input.order_id,
            ip_id: input.ip_id,
            buyer_principal: input.buyer_principal,
            mint_to: input.mint_to,
            payment_mode: input.payment_mode,
            amount_sats,
            network: input.network,
            escrow,
            ckbtc_subaccount,
            status: OrderStatus::Pending,
            confirmations: 0,
            created_at: now,
            updated_at: now,
            funded_at: None,
            finalizing_since: None,
            finalized_at: None,
            payment_proof: None,
            evidence: None,
            last_error: None,
            evidence_payload: None,
            owner_principal: input.owner_principal,
        })
    }

    /// The rendered escrow target.
    pub fn escrow_address(&self) -> String {
        self.escrow.render()
    }

    /// Whether the `finalizing` lock is older than `ttl`.
    pub fn lock_is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (self.status, self.finalizing_since) {
            (OrderStatus::Finalizing, Some(since)) => now - since >= ttl,
            (OrderStatus::Finalizing, None) => true,
            _ => false,
        }
    }

    /// Patch payment-detection fields.
    ///
    /// `status` must be a funding-phase status at or after the current one.
    /// A same-status patch only refreshes proof and confirmations.
    pub fn apply_funding(
        &mut self,
        status: OrderStatus,
        proof: Option<PaymentProof>,
        confirmations: u32,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !status.is_funding_phase() {
            return Err(TransitionError::NotAFundingStatus {
                order_id: self.order_id.clone(),
                to: status,
            });
        }
        if status != self.status && !self.status.can_transition_to(status) {
            return Err(TransitionError::InvalidTransition {
                order_id: self.order_id.clone(),
                from: self.status,
                to: status,
            });
        }
        if status != OrderStatus::Pending && self.funded_at.is_none() {
            self.funded_at = Some(now);
        }
        self.status = status;
        if proof.is_some() {
            self.payment_proof = proof;
        }
        self.confirmations = confirmations;
        self.updated_at = now;
        Ok(())
    }

    /// The atomic check-and-set behind `request_finalization`.
    pub fn try_lock(&mut self, now: DateTime<Utc>, ttl: Duration) -> FinalizationLock {
        let free = match self.status {
            OrderStatus::Finalized => false,
            OrderStatus::Finalizing => self.lock_is_stale(now, ttl),
            _ => true,
        };
        if !free {
            return FinalizationLock::refused(self.status);
        }
        self.status = OrderStatus::Finalizing;
        self.finalizing_since = Some(now);
        self.updated_at = now;
        FinalizationLock::granted(now)
    }

    /// Fails unless the order is `finalizing` under the lock granted at
    /// `granted_at`.
    fn check_lock(
        &self,
        granted_at: DateTime<Utc>,
        to: OrderStatus,
    ) -> Result<(), TransitionError> {
        if self.status != OrderStatus::Finalizing {
            return Err(TransitionError::InvalidTransition {
                order_id: self.order_id.clone(),
                from: self.status,
                to,
            });
        }
        if self.finalizing_since != Some(granted_at) {
            return Err(TransitionError::LockNotHeld {
                order_id: self.order_id.clone(),
                granted_at,
            });
        }
        Ok(())
    }

    /// Record a successful finalization by the current lock holder.
    pub fn complete(&mut self, completion: OrderCompletion) -> Result<(), TransitionError> {
        self.check_lock(completion.lock_granted_at, OrderStatus::Finalized)?;
        self.status = OrderStatus::Finalized;
        self.evidence = Some(completion.evidence);
        if completion.owner_principal.is_some() {
            self.owner_principal = completion.owner_principal;
        }
        if completion.payment_proof.is_some() {
            self.payment_proof = completion.payment_proof;
        }
        self.finalized_at = Some(completion.completed_at);
        self.finalizing_since = None;
        self.last_error = None;
        self.updated_at = completion.completed_at;
        Ok(())
    }

    /// Release the lock granted at `granted_at` after a failed saga.
    pub fn fail(
        &mut self,
        message: &str,
        granted_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.check_lock(granted_at, OrderStatus::Failed)?;
        self.status = OrderStatus::Failed;
        self.last_error = Some(message.to_string());
        self.finalizing_since = None;
        self.updated_at = now;
        Ok(())
    }

    /// Refresh the compliance score after new training units were recorded.
    /// No-op for orders that are not finalized.
    pub fn rescore(&mut self, compliance_score: u8, training_units: u64, now: DateTime<Utc>) -> bool {
        match (&self.status, self.evidence.as_mut()) {
            (OrderStatus::Finalized, Some(evidence)) => {
                evidence.compliance_score = compliance_score;
                evidence.training_units = training_units;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }
}
