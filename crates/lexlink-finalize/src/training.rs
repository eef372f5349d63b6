//! # Training Batch Recording
//!
//! A training batch records usage of an IP asset. Recording one anchors
//! its evidence hash, appends the batch, and refreshes the compliance
//! score of every finalized order of the asset, since the score's
//! training bonus depends on the running total.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use uuid::Uuid;

use lexlink_core::{sha256_hex, CanonicalBytes, IpId};
use lexlink_state::{
    Actor, AnchorOutcome, AuditAction, ComplianceInputs, LicenseOrder, OrderStatus, ResourceKind,
    TrainingBatch,
};
use lexlink_store::{AuditLog, OrderStore, RecordStore};

use crate::capability::EvidenceAnchor;
use crate::error::FinalizeError;

/// What [`TrainingRecorder::record`] did.
#[derive(Debug, Clone)]
pub struct TrainingRecord {
    pub batch: TrainingBatch,
    /// Units recorded for the IP asset, this batch included.
    pub total_units: u64,
    /// Finalized orders whose score was rewritten.
    pub rescored_orders: usize,
}

#[derive(Clone)]
pub struct TrainingRecorder {
    orders: Arc<dyn OrderStore>,
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
    anchor: Arc<dyn EvidenceAnchor>,
}

impl TrainingRecorder {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditLog>,
        anchor: Arc<dyn EvidenceAnchor>,
    ) -> Self {
        Self {
            orders,
            records,
            audit,
            anchor,
        }
    }

    pub async fn record(
        &self,
        actor: &Actor,
        ip_id: &IpId,
        units: i64,
    ) -> Result<TrainingRecord, FinalizeError> {
        let units = TrainingBatch::validate_units(units)?;
        let ip = self
            .records
            .get_ip(ip_id)
            .await?
            .ok_or_else(|| FinalizeError::IpNotFound(ip_id.clone()))?;

        let batch_id = Uuid::new_v4();
        let now = Utc::now();
        let payload = json!({
            "kind": "TRAINING_BATCH",
            "batchId": batch_id.to_string(),
            "ipId": ip_id,
            "units": units,
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        let evidence_hash = sha256_hex(&CanonicalBytes::from_value(payload.clone())?);
        let anchor = match self.anchor.publish_evidence(&evidence_hash, &payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(ip_id = %ip_id, "training evidence anchoring failed: {e}");
                AnchorOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        let owner = ip
            .owner_principal
            .clone()
            .or_else(|| (!actor.is_privileged()).then(|| actor.principal.clone()));
        let batch = TrainingBatch {
            batch_id,
            ip_id: ip_id.clone(),
            units,
            evidence_hash,
            anchor,
            owner_principal: owner,
            created_at: now,
        };
        self.records.insert_training_batch(batch.clone()).await?;

        if let Err(e) = self
            .audit
            .append(
                AuditAction::TrainingBatchRecorded,
                ResourceKind::TrainingBatch,
                &batch_id.to_string(),
                &actor.principal,
                json!({
                    "ipId": ip_id,
                    "units": units,
                    "evidenceHash": batch.evidence_hash,
                    "anchorStatus": batch.anchor.status_str(),
                }),
            )
            .await
        {
            tracing::warn!("training audit event not recorded: {e}");
        }

        let total_units = self.records.training_units_for(ip_id).await?;
        let rescored_orders = self.rescore(ip_id, total_units).await?;
        tracing::info!(
            ip_id = %ip_id,
            units,
            total_units,
            rescored_orders,
            "training batch recorded"
        );
        Ok(TrainingRecord {
            batch,
            total_units,
            rescored_orders,
        })
    }

    /// Recompute the score of each finalized order of `ip_id`. A failed
    /// update is logged and skipped.
    async fn rescore(&self, ip_id: &IpId, total_units: u64) -> Result<usize, FinalizeError> {
        let mut rescored = 0;
        for order in self.orders.list_by_ip(ip_id).await? {
            let Some(inputs) = compliance_inputs(&order, total_units) else {
                continue;
            };
            match self
                .orders
                .update_compliance(&order.order_id, inputs.score(), total_units)
                .await
            {
                Ok(true) => rescored += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(order_id = %order.order_id, "rescore failed: {e}");
                }
            }
        }
        Ok(rescored)
    }
}

/// Score inputs of a finalized order with a new training total.
fn compliance_inputs(order: &LicenseOrder, training_units: u64) -> Option<ComplianceInputs> {
    if order.status != OrderStatus::Finalized {
        return None;
    }
    let evidence = order.evidence.as_ref()?;
    Some(ComplianceInputs {
        has_payment: order.payment_proof.is_some(),
        has_license_token: !evidence.token_on_chain_id.is_empty(),
        anchor_ok: evidence.anchor.is_ok(),
        has_archive: !evidence.archive_hash.is_empty(),
        training_units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DisabledAnchor;
    use lexlink_core::{EvmAddress, OrderId, Principal};
    use lexlink_state::{
        Creator, FinalizedEvidence, IpAsset, Network, NewIpAsset, NewOrder, OrderCompletion,
        PaymentMode, PaymentProof, Role, Subaccount,
    };
    use lexlink_store::MemoryStore;

    async fn seeded() -> (MemoryStore, TrainingRecorder) {
        let store = MemoryStore::new();
        let ip = IpAsset::register(
            NewIpAsset {
                ip_id: IpId::new("ip-1").unwrap(),
                title: "Dataset".into(),
                media_url: "ipfs://bafy".into(),
                license_terms_id: "terms-1".into(),
                royalty_bps: 0,
                commercial_use: true,
                derivatives_allowed: true,
                creators: vec![Creator {
                    name: "Ada".into(),
                    contribution_percent: 100,
                }],
                parent_ip_ids: vec![],
                content_hash: None,
            },
            Some(Principal::new("creator-1").unwrap()),
            Utc::now(),
        )
        .unwrap();
        store.insert_ip(ip).await.unwrap();
        let s = Arc::new(store.clone());
        let recorder = TrainingRecorder::new(s.clone(), s.clone(), s, Arc::new(DisabledAnchor));
        (store, recorder)
    }

    async fn finalized_order(store: &MemoryStore, id: &str) {
        let order_id = OrderId::new(id).unwrap();
        let order = LicenseOrder::new_pending(
            NewOrder {
                order_id: order_id.clone(),
                ip_id: IpId::new("ip-1").unwrap(),
                buyer_principal: None,
                mint_to: EvmAddress::parse("0x00000000000000000000000000000000000000aa")
                    .unwrap(),
                payment_mode: PaymentMode::Ckbtc,
                amount_sats: 1_000,
                network: Network::Testnet,
                btc_address: None,
                owner_principal: None,
            },
            "escrow-owner",
            Utc::now(),
        )
        .unwrap();
        store.insert(order).await.unwrap();
        let lock = store.request_finalization(&order_id, Utc::now()).await.unwrap();
        store
            .mark_completed(
                &order_id,
                OrderCompletion {
                    evidence: FinalizedEvidence {
                        token_on_chain_id: "7".into(),
                        attestation_hash: "a".repeat(64),
                        content_hash: "c".repeat(64),
                        evidence_hash: "e".repeat(64),
                        anchor: AnchorOutcome::Ok {
                            tx_ref: "tx".into(),
                            explorer_url: None,
                        },
                        archive_hash: "f".repeat(64),
                        archive_uri: None,
                        archive_file_name: format!("{id}.zip"),
                        vc_document: json!({}),
                        vc_hash: "d".repeat(64),
                        compliance_score: 100,
                        training_units: 0,
                    },
                    owner_principal: None,
                    payment_proof: Some(PaymentProof::Ckbtc {
                        subaccount: Subaccount::derive(&order_id),
                        minted_amount: 1_000,
                        block_index: None,
                    }),
                    completed_at: Utc::now(),
                    lock_granted_at: lock.granted_at.unwrap(),
                },
            )
            .await
            .unwrap();
    }

    fn actor() -> Actor {
        Actor::new(Principal::new("creator-1").unwrap(), Role::Creator)
    }

    #[tokio::test]
    async fn batch_is_recorded_with_anchor_outcome() {
        let (store, recorder) = seeded().await;
        let out = recorder
            .record(&actor(), &IpId::new("ip-1").unwrap(), 10)
            .await
            .unwrap();
        assert_eq!(out.total_units, 10);
        assert_eq!(out.batch.anchor.status_str(), "skipped");
        assert_eq!(out.batch.owner_principal.unwrap().as_str(), "creator-1");
        assert!(store
            .get_training_batch(out.batch.batch_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn finalized_orders_are_rescored() {
        let (store, recorder) = seeded().await;
        finalized_order(&store, "o-1").await;
        let ip_id = IpId::new("ip-1").unwrap();

        let out = recorder.record(&actor(), &ip_id, 30).await.unwrap();
        assert_eq!(out.rescored_orders, 1);
        let order = store.get(&OrderId::new("o-1").unwrap()).await.unwrap().unwrap();
        let evidence = order.evidence.unwrap();
        assert_eq!(evidence.training_units, 30);
        assert_eq!(evidence.compliance_score, 100);
    }

    #[tokio::test]
    async fn zero_units_rejected() {
        let (_, recorder) = seeded().await;
        let err = recorder
            .record(&actor(), &IpId::new("ip-1").unwrap(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_ip_rejected() {
        let (_, recorder) = seeded().await;
        let err = recorder
            .record(&actor(), &IpId::new("ip-9").unwrap(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::IpNotFound(_)));
    }
}
