//! # Funding Poller
//!
//! One run scans every order in `pending`, `funded` or `confirmed` and
//! checks its escrow:
//!
//! - `ckbtc`: the escrow subaccount's ledger balance. Once it covers the
//!   amount the order is locked and finalized as the system actor.
//! - `btc`: the escrow address on a block explorer. The first sighting of
//!   enough funds moves the order to `funded`; once the network's required
//!   confirmations are reached it moves to `confirmed` and is finalized.
//!
//! `confirmed` orders stay candidates so that a crash between confirmation
//! and finalization heals on the next run. Orders are processed
//! independently with bounded concurrency; a failing order is reported in
//! the summary and never stops the run. There are no retries within a run.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use lexlink_core::OrderId;
use lexlink_state::{Actor, EscrowTarget, LicenseOrder, OrderStatus, PaymentProof};
use lexlink_store::OrderStore;

use crate::capability::{BlockExplorer, CapabilityError, LedgerAccount, LedgerClient};
use crate::error::FinalizeError;
use crate::orchestrator::{FinalizeOutcome, Finalizer};

/// What happened to one order during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Escrow does not yet cover the amount.
    AwaitingFunds { received_sats: u64 },
    /// Paid, waiting for confirmations.
    Funded { confirmations: u32, required: u32 },
    Finalized { token_id: String },
    AlreadyFinalized,
    InProgress,
    Error { message: String },
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingFunds { .. } => "awaiting_funds",
            Self::Funded { .. } => "funded",
            Self::Finalized { .. } => "finalized",
            Self::AlreadyFinalized => "already_finalized",
            Self::InProgress => "in_progress",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPollResult {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub outcome: PollOutcome,
}

/// Summary of one poll run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub processed: usize,
    pub outcomes: Vec<OrderPollResult>,
}

impl PollSummary {
    pub fn count(&self, outcome: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|r| r.outcome.as_str() == outcome)
            .count()
    }
}

#[derive(Debug, thiserror::Error)]
enum PollError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error("order {0} has an escrow that does not match its payment mode")]
    EscrowMismatch(OrderId),
    #[error("explorer reported funds without a transaction id")]
    MissingTxId,
}

impl From<lexlink_store::StoreError> for PollError {
    fn from(e: lexlink_store::StoreError) -> Self {
        Self::Finalize(FinalizeError::Store(e))
    }
}

#[derive(Clone)]
pub struct FundingPoller {
    finalizer: Finalizer,
    ledger: Arc<dyn LedgerClient>,
    explorer: Arc<dyn BlockExplorer>,
    concurrency: usize,
}

impl FundingPoller {
    pub fn new(
        finalizer: Finalizer,
        ledger: Arc<dyn LedgerClient>,
        explorer: Arc<dyn BlockExplorer>,
        concurrency: usize,
    ) -> Self {
        Self {
            finalizer,
            ledger,
            explorer,
            concurrency: concurrency.max(1),
        }
    }

    fn orders(&self) -> &Arc<dyn OrderStore> {
        self.finalizer.orders()
    }

    /// Scan every candidate once.
    pub async fn run_once(&self) -> Result<PollSummary, FinalizeError> {
        let candidates = self
            .orders()
            .list_by_status(&OrderStatus::POLL_CANDIDATES)
            .await?;
        tracing::info!(candidates = candidates.len(), "funding poll started");

        let outcomes: Vec<OrderPollResult> = stream::iter(candidates)
            .map(|order| async move {
                let order_id = order.order_id.clone();
                let outcome = match self.poll_order(order).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(order_id = %order_id, "poll failed: {e}");
                        PollOutcome::Error {
                            message: e.to_string(),
                        }
                    }
                };
                metrics::counter!("lexlink_poll_orders_total", "outcome" => outcome.as_str())
                    .increment(1);
                OrderPollResult { order_id, outcome }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let summary = PollSummary {
            processed: outcomes.len(),
            outcomes,
        };
        tracing::info!(
            processed = summary.processed,
            finalized = summary.count("finalized"),
            errors = summary.count("error"),
            "funding poll finished"
        );
        Ok(summary)
    }

    async fn poll_order(&self, order: LicenseOrder) -> Result<PollOutcome, PollError> {
        match &order.escrow {
            EscrowTarget::Ckbtc { owner, subaccount } => {
                let account = LedgerAccount {
                    owner: owner.clone(),
                    subaccount: *subaccount,
                };
                self.poll_ledger(&order, account).await
            }
            EscrowTarget::Btc { address } => self.poll_chain(&order, address).await,
        }
    }

    async fn poll_ledger(
        &self,
        order: &LicenseOrder,
        account: LedgerAccount,
    ) -> Result<PollOutcome, PollError> {
        if order.ckbtc_subaccount != account.subaccount {
            return Err(PollError::EscrowMismatch(order.order_id.clone()));
        }
        let balance = self.ledger.balance_of(&account).await?;
        if balance < order.amount_sats {
            return Ok(PollOutcome::AwaitingFunds {
                received_sats: balance,
            });
        }
        let proof = PaymentProof::Ckbtc {
            subaccount: account.subaccount,
            minted_amount: balance,
            block_index: None,
        };
        self.finalize(order, proof).await
    }

    async fn poll_chain(
        &self,
        order: &LicenseOrder,
        address: &str,
    ) -> Result<PollOutcome, PollError> {
        let funding = self.explorer.address_funding(address, order.network).await?;
        if funding.received_sats < order.amount_sats {
            return Ok(PollOutcome::AwaitingFunds {
                received_sats: funding.received_sats,
            });
        }
        let tx_id = funding.tx_id.ok_or(PollError::MissingTxId)?;
        let proof = PaymentProof::Btc { tx_id };
        let required = order.network.required_confirmations();

        if order.status == OrderStatus::Pending {
            self.orders()
                .update_funding_state(
                    &order.order_id,
                    OrderStatus::Funded,
                    Some(proof.clone()),
                    funding.confirmations,
                )
                .await?;
            tracing::info!(order_id = %order.order_id, "escrow funded");
        }
        if funding.confirmations < required {
            if order.status != OrderStatus::Pending {
                self.orders()
                    .update_funding_state(
                        &order.order_id,
                        order.status,
                        Some(proof),
                        funding.confirmations,
                    )
                    .await?;
            }
            return Ok(PollOutcome::Funded {
                confirmations: funding.confirmations,
                required,
            });
        }

        self.orders()
            .update_funding_state(
                &order.order_id,
                OrderStatus::Confirmed,
                Some(proof.clone()),
                funding.confirmations,
            )
            .await?;
        self.finalize(order, proof).await
    }

    async fn finalize(
        &self,
        order: &LicenseOrder,
        proof: PaymentProof,
    ) -> Result<PollOutcome, PollError> {
        let outcome = self
            .finalizer
            .lock_and_finalize(&Actor::system(), &order.order_id, Some(proof))
            .await?;
        Ok(match outcome {
            FinalizeOutcome::Finalized(result) => PollOutcome::Finalized {
                token_id: result.evidence.token_on_chain_id,
            },
            FinalizeOutcome::AlreadyFinalized => PollOutcome::AlreadyFinalized,
            FinalizeOutcome::InProgress => PollOutcome::InProgress,
        })
    }
}
