//! # Finalization Orchestrator
//!
//! Runs the license finalization saga for one order whose lock the caller
//! already holds. Steps run strictly in sequence:
//!
//! Before the lock is requested, a `ckbtc` order's escrow balance is read
//! from the ledger; an order holding less than its price is refused and
//! the proof is built from the observed balance, never from the caller.
//! Once the lock is granted the order is re-read and the saga runs on that
//! record.
//!
//! | # | Step                 | On failure                    |
//! |---|----------------------|-------------------------------|
//! | 1 | payment confirmation | abort (`btc` only)            |
//! | 2 | attestation + hash   | abort                         |
//! | 3 | mint (with retry)    | abort                         |
//! | 4 | media + content hash | abort                         |
//! | 5 | evidence payload     | payload save is best effort   |
//! | 6 | anchoring            | recorded as `failed`, continue|
//! | 7 | archive + upload     | build aborts, upload degrades |
//! | 8 | credential           | abort                         |
//! | 9 | compliance score     | training units default to 0   |
//! |10 | commit + audit       | commit aborts, audit degrades |
//!
//! An abort marks the order `failed` (which frees the lock for a retry),
//! appends a `LICENSE_FINALIZATION_FAILED` audit event, and returns the
//! original error.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::Instrument;

use lexlink_core::{sha256_bytes_hex, sha256_hex, CanonicalBytes, OrderId};
use lexlink_state::{
    Actor, AnchorOutcome, AuditAction, ComplianceInputs, EscrowTarget, FinalizedEvidence, IpAsset,
    LicenseOrder, OrderCompletion, OrderStatus, PaymentMode, PaymentProof, ResourceKind,
};
use lexlink_store::{AuditLog, OrderStore, RecordStore};

use crate::capability::{
    ArchiveBuilder, ArchiveInput, AttestationSource, BuiltArchive, ContentStore,
    CredentialIssuer, CredentialRequest, EvidenceAnchor, LedgerAccount, LedgerClient,
    LicenseMinter, MediaFetcher, MintRequest, PaymentVerifier,
};
use crate::config::FinalizeConfig;
use crate::error::FinalizeError;
use crate::mint::{mint_with_retry, MintPolicy};

/// The external capabilities the saga calls.
#[derive(Clone)]
pub struct Capabilities {
    pub payment: Arc<dyn PaymentVerifier>,
    pub ledger: Arc<dyn LedgerClient>,
    pub attestation: Arc<dyn AttestationSource>,
    pub minter: Arc<dyn LicenseMinter>,
    pub media: Arc<dyn MediaFetcher>,
    pub anchor: Arc<dyn EvidenceAnchor>,
    pub archive: Arc<dyn ArchiveBuilder>,
    pub content_store: Arc<dyn ContentStore>,
    pub credentials: Arc<dyn CredentialIssuer>,
}

/// Everything a successful saga produced.
#[derive(Debug, Clone)]
pub struct FinalizationResult {
    pub order_id: OrderId,
    pub evidence: FinalizedEvidence,
    /// Archive bytes, available even when the upload failed.
    pub archive: BuiltArchive,
    pub payment_proof: PaymentProof,
    pub mint_attempts: u32,
}

/// Result of [`Finalizer::lock_and_finalize`].
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Finalized(Box<FinalizationResult>),
    /// The order was finalized earlier; nothing was called.
    AlreadyFinalized,
    /// Another saga holds the lock; nothing was called.
    InProgress,
}

impl FinalizeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finalized(_) => "finalized",
            Self::AlreadyFinalized => "already_finalized",
            Self::InProgress => "in_progress",
        }
    }
}

/// Runs finalization sagas against a set of stores and capabilities.
#[derive(Clone)]
pub struct Finalizer {
    orders: Arc<dyn OrderStore>,
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
    caps: Capabilities,
    mint_policy: MintPolicy,
}

impl Finalizer {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditLog>,
        caps: Capabilities,
        config: &FinalizeConfig,
    ) -> Self {
        Self {
            orders,
            records,
            audit,
            caps,
            mint_policy: config.mint_policy(),
        }
    }

    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    /// Acquire the order's lock and, if granted, run the saga.
    ///
    /// `payment` overrides the stored proof for `btc` orders. For `ckbtc`
    /// orders only its `block_index` is kept; the amount comes from the
    /// ledger. Preconditions are checked before the lock is requested so a
    /// rejected request never leaves the order `finalizing`.
    pub async fn lock_and_finalize(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        payment: Option<PaymentProof>,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| FinalizeError::OrderNotFound(order_id.clone()))?;
        if order.status == OrderStatus::Finalized {
            return Ok(FinalizeOutcome::AlreadyFinalized);
        }
        let ip = self
            .records
            .get_ip(&order.ip_id)
            .await?
            .ok_or_else(|| FinalizeError::IpNotFound(order.ip_id.clone()))?;
        let explicit = match order.payment_mode {
            PaymentMode::Ckbtc => Some(self.observed_ledger_payment(&order, payment).await?),
            PaymentMode::Btc => payment,
        };
        select_payment(&order, explicit.clone())?;

        let lock = self
            .orders
            .request_finalization(order_id, Utc::now())
            .await?;
        let Some(granted_at) = lock.granted_at.filter(|_| lock.proceed) else {
            metrics::counter!("lexlink_finalize_total", "outcome" => "contended").increment(1);
            tracing::info!(
                order_id = %order_id,
                status = %lock.status,
                "finalization lock not granted"
            );
            return Ok(match lock.status {
                OrderStatus::Finalized => FinalizeOutcome::AlreadyFinalized,
                _ => FinalizeOutcome::InProgress,
            });
        };

        let (order, payment) = match self.reload_locked(order_id, explicit).await {
            Ok(locked) => locked,
            Err(e) => {
                tracing::error!(order_id = %order_id, "locked order unusable: {e}");
                self.record_failure(actor, order_id, granted_at, &e).await;
                return Err(e);
            }
        };
        let result = self.finalize(actor, &order, &ip, granted_at, &payment).await?;
        Ok(FinalizeOutcome::Finalized(Box::new(result)))
    }

    /// Read the escrow subaccount balance and build the `ckbtc` proof from
    /// it. Fails with [`FinalizeError::Unfunded`] below the order price.
    async fn observed_ledger_payment(
        &self,
        order: &LicenseOrder,
        claimed: Option<PaymentProof>,
    ) -> Result<PaymentProof, FinalizeError> {
        let block_index = match claimed {
            None => None,
            Some(PaymentProof::Ckbtc { block_index, .. }) => block_index,
            Some(other) => {
                return Err(FinalizeError::PaymentModeMismatch {
                    order_id: order.order_id.clone(),
                    expected: order.payment_mode,
                    actual: other.mode(),
                })
            }
        };
        let EscrowTarget::Ckbtc { owner, subaccount } = &order.escrow else {
            return Err(FinalizeError::PaymentModeMismatch {
                order_id: order.order_id.clone(),
                expected: order.payment_mode,
                actual: PaymentMode::Btc,
            });
        };
        let balance = self
            .caps
            .ledger
            .balance_of(&LedgerAccount {
                owner: owner.clone(),
                subaccount: *subaccount,
            })
            .await
            .map_err(FinalizeError::Ledger)?;
        if balance < order.amount_sats {
            tracing::info!(
                order_id = %order.order_id,
                required = order.amount_sats,
                received = balance,
                "escrow not funded"
            );
            return Err(FinalizeError::Unfunded {
                order_id: order.order_id.clone(),
                required: order.amount_sats,
                received: balance,
            });
        }
        Ok(PaymentProof::Ckbtc {
            subaccount: *subaccount,
            minted_amount: balance,
            block_index,
        })
    }

    /// The order as stored once the lock is held, with its payment proof.
    async fn reload_locked(
        &self,
        order_id: &OrderId,
        explicit: Option<PaymentProof>,
    ) -> Result<(LicenseOrder, PaymentProof), FinalizeError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| FinalizeError::OrderNotFound(order_id.clone()))?;
        let payment = select_payment(&order, explicit)?;
        Ok((order, payment))
    }

    /// Run the saga under the lock granted at `granted_at`.
    async fn finalize(
        &self,
        actor: &Actor,
        order: &LicenseOrder,
        ip: &IpAsset,
        granted_at: DateTime<Utc>,
        payment: &PaymentProof,
    ) -> Result<FinalizationResult, FinalizeError> {
        let span = tracing::info_span!(
            "finalize",
            order_id = %order.order_id,
            ip_id = %order.ip_id,
            mode = %order.payment_mode,
            actor = %actor.principal,
        );
        async move {
            match self.run_saga(actor, order, ip, granted_at, payment).await {
                Ok(result) => {
                    metrics::counter!("lexlink_finalize_total", "outcome" => "finalized")
                        .increment(1);
                    Ok(result)
                }
                Err(e) => {
                    metrics::counter!("lexlink_finalize_total", "outcome" => "failed")
                        .increment(1);
                    tracing::error!(step = e.step(), "finalization failed: {e}");
                    self.record_failure(actor, &order.order_id, granted_at, &e)
                        .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_saga(
        &self,
        actor: &Actor,
        order: &LicenseOrder,
        ip: &IpAsset,
        granted_at: DateTime<Utc>,
        payment: &PaymentProof,
    ) -> Result<FinalizationResult, FinalizeError> {
        let order_id = &order.order_id;
        let receiver = &order.mint_to;
        let reference = payment.reference();
        let payment_reference = reference.as_str();

        // 1. Payment.
        match payment {
            PaymentProof::Btc { tx_id } => {
                self.caps
                    .payment
                    .confirm_payment(order_id, tx_id)
                    .await
                    .map_err(FinalizeError::Payment)?;
            }
            PaymentProof::Ckbtc { .. } => {
                tracing::debug!("ledger payment, confirmation skipped");
            }
        }

        // 2. Attestation.
        let attestation = self
            .caps
            .attestation
            .fetch_attestation(order_id)
            .await
            .map_err(FinalizeError::Attestation)?;
        let attestation_hash = sha256_hex(&CanonicalBytes::from_external_json(&attestation)?);

        // 3. Mint.
        let mint_request = MintRequest {
            ip_id: ip.ip_id.clone(),
            license_terms_id: ip.license_terms_id.clone(),
            receiver: receiver.clone(),
            order_id: order_id.clone(),
        };
        let minted =
            mint_with_retry(self.caps.minter.as_ref(), &mint_request, self.mint_policy).await?;
        let token_id = minted.token_id.clone();

        // 4. Media.
        let media = self
            .caps
            .media
            .fetch_media(&ip.media_url)
            .await
            .map_err(FinalizeError::Media)?;
        let content_hash = sha256_bytes_hex(&media);
        if let Some(registered) = &ip.content_hash {
            if registered != &content_hash {
                tracing::warn!(
                    registered = %registered,
                    fetched = %content_hash,
                    "media content differs from registered hash"
                );
            }
        }

        // 5. Evidence payload.
        let now = Utc::now();
        let payload = json!({
            "kind": "LICENSE_COMPLETED",
            "orderId": order_id,
            "ipId": ip.ip_id,
            "tokenId": token_id,
            "paymentReference": payment_reference,
            "attestationHash": attestation_hash,
            "contentHash": content_hash,
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        let evidence_hash = sha256_hex(&CanonicalBytes::from_value(payload.clone())?);
        if let Err(e) = self.orders.save_evidence_payload(order_id, &payload).await {
            tracing::warn!("evidence payload not saved: {e}");
        }

        // 6. Anchoring.
        let anchor = match self
            .caps
            .anchor
            .publish_evidence(&evidence_hash, &payload)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("evidence anchoring failed: {e}");
                AnchorOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        // 7. Archive.
        let archive = self
            .caps
            .archive
            .build_archive(&ArchiveInput {
                order_id: order_id.clone(),
                ip_id: ip.ip_id.clone(),
                media,
                media_url: ip.media_url.clone(),
                proof_fields: json!({
                    "orderId": order_id,
                    "ipId": ip.ip_id,
                    "tokenId": token_id,
                    "paymentReference": payment_reference,
                    "attestationHash": attestation_hash,
                    "contentHash": content_hash,
                    "evidenceHash": evidence_hash,
                    "anchorStatus": anchor.status_str(),
                    "anchorTxRef": anchor.tx_ref(),
                    "anchorDetail": anchor.detail(),
                }),
            })
            .await
            .map_err(FinalizeError::Archive)?;
        let archive_uri = match self
            .caps
            .content_store
            .upload(&archive.file_name, &archive.bytes)
            .await
        {
            Ok(uri) => Some(uri),
            Err(e) => {
                tracing::warn!("archive upload failed: {e}");
                None
            }
        };

        // 8. Credential.
        let credential = self
            .caps
            .credentials
            .issue_credential(&CredentialRequest {
                subject_id: CredentialRequest::subject_for(receiver),
                order_id: order_id.clone(),
                ip_id: ip.ip_id.clone(),
                token_id: token_id.clone(),
                payment_reference: payment_reference.to_string(),
                content_hash: content_hash.clone(),
                evidence_hash: evidence_hash.clone(),
                attestation_hash: attestation_hash.clone(),
                archive_hash: archive.archive_hash.clone(),
            })
            .await
            .map_err(FinalizeError::Credential)?;

        // 9. Compliance.
        let training_units = match self.records.training_units_for(&ip.ip_id).await {
            Ok(units) => units,
            Err(e) => {
                tracing::warn!("training units unavailable, scoring without them: {e}");
                0
            }
        };
        let compliance_score = ComplianceInputs {
            has_payment: true,
            has_license_token: true,
            anchor_ok: anchor.is_ok(),
            has_archive: !archive.archive_hash.is_empty(),
            training_units,
        }
        .score();

        // 10. Commit.
        let evidence = FinalizedEvidence {
            token_on_chain_id: token_id.clone(),
            attestation_hash,
            content_hash,
            evidence_hash,
            anchor,
            archive_hash: archive.archive_hash.clone(),
            archive_uri,
            archive_file_name: archive.file_name.clone(),
            vc_document: credential.document,
            vc_hash: credential.hash,
            compliance_score,
            training_units,
        };
        self.orders
            .mark_completed(
                order_id,
                OrderCompletion {
                    evidence: evidence.clone(),
                    owner_principal: order
                        .owner_principal
                        .clone()
                        .or_else(|| ip.owner_principal.clone()),
                    payment_proof: Some(payment.clone()),
                    completed_at: Utc::now(),
                    lock_granted_at: granted_at,
                },
            )
            .await?;

        let audit_payload = json!({
            "tokenId": token_id,
            "paymentReference": payment_reference,
            "evidenceHash": evidence.evidence_hash,
            "anchorStatus": evidence.anchor.status_str(),
            "anchorTxRef": evidence.anchor.tx_ref(),
            "archiveHash": evidence.archive_hash,
            "archiveUri": evidence.archive_uri,
            "vcHash": evidence.vc_hash,
            "complianceScore": compliance_score,
            "trainingUnits": training_units,
            "mintAttempts": minted.attempts,
        });
        if let Err(e) = self
            .audit
            .append(
                AuditAction::LicenseCompleted,
                ResourceKind::LicenseOrder,
                order_id.as_str(),
                &actor.principal,
                audit_payload,
            )
            .await
        {
            tracing::warn!("completion audit event not recorded: {e}");
        }

        tracing::info!(
            token_id = %token_id,
            compliance_score,
            anchor = evidence.anchor.status_str(),
            "order finalized"
        );
        Ok(FinalizationResult {
            order_id: order_id.clone(),
            evidence,
            archive,
            payment_proof: payment.clone(),
            mint_attempts: minted.attempts,
        })
    }

    /// Release the lock and audit the failure. Errors here are logged only.
    async fn record_failure(
        &self,
        actor: &Actor,
        order_id: &OrderId,
        granted_at: DateTime<Utc>,
        error: &FinalizeError,
    ) {
        let message = error.to_string();
        if let Err(e) = self
            .orders
            .mark_finalization_failed(order_id, granted_at, &message)
            .await
        {
            tracing::error!("could not mark order failed: {e}");
        }
        if let Err(e) = self
            .audit
            .append(
                AuditAction::LicenseFinalizationFailed,
                ResourceKind::LicenseOrder,
                order_id.as_str(),
                &actor.principal,
                json!({ "step": error.step(), "error": message }),
            )
            .await
        {
            tracing::warn!("failure audit event not recorded: {e}");
        }
    }
}

/// Pick the payment proof for a saga: the explicit one, else the stored one.
fn select_payment(
    order: &LicenseOrder,
    explicit: Option<PaymentProof>,
) -> Result<PaymentProof, FinalizeError> {
    let proof = explicit
        .or_else(|| order.payment_proof.clone())
        .ok_or_else(|| FinalizeError::MissingPaymentProof(order.order_id.clone()))?;
    if proof.mode() != order.payment_mode {
        return Err(FinalizeError::PaymentModeMismatch {
            order_id: order.order_id.clone(),
            expected: order.payment_mode,
            actual: proof.mode(),
        });
    }
    Ok(proof)
}
