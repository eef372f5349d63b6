//! # In-Memory Backend
//!
//! Used when no database is configured and throughout the test suites.
//!
//! All operations are synchronous under the hood (the locks are
//! `parking_lot`, not `tokio::sync`) because no guard is ever held across an
//! `.await`. Every read-check-write sequence, most importantly
//! `request_finalization`, runs inside a single write guard, which makes it
//! atomic with respect to every other caller.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use lexlink_core::{IpId, OrderId, Principal};
use lexlink_state::records::verify_chain;
use lexlink_state::{
    AuditAction, AuditEvent, ChainIntegrity, Dispute, FinalizationLock, IpAsset, LicenseOrder,
    OrderCompletion, OrderStatus, PaymentProof, ResourceKind, TrainingBatch, GENESIS_HASH,
};

use crate::{AuditLog, OrderStore, RecordStore, StoreError, DEFAULT_LOCK_TTL_SECS};

// ── Table ────────────────────────────────────────────────────────────

/// A keyed table behind a `parking_lot::RwLock`.
#[derive(Debug)]
struct Table<K, T> {
    rows: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Table<K, T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<K: Eq + Hash + Clone, T: Clone> Table<K, T> {
    fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert unless the key exists. Returns false on conflict.
    fn insert_new(&self, key: K, value: T) -> bool {
        let mut rows = self.rows.write();
        if rows.contains_key(&key) {
            return false;
        }
        rows.insert(key, value);
        true
    }

    fn get(&self, key: &K) -> Option<T> {
        self.rows.read().get(key).cloned()
    }

    fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.read().values().filter(|v| pred(v)).cloned().collect()
    }

    /// Run `f` on the row under the write guard. `None` if absent.
    fn try_update<R, E>(&self, key: &K, f: impl FnOnce(&mut T) -> Result<R, E>) -> Option<Result<R, E>> {
        self.rows.write().get_mut(key).map(f)
    }
}

// ── MemoryStore ──────────────────────────────────────────────────────

/// In-memory implementation of all three store traits.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    orders: Table<OrderId, LicenseOrder>,
    ips: Table<IpId, IpAsset>,
    batches: Table<Uuid, TrainingBatch>,
    disputes: Table<Uuid, Dispute>,
    audit: Arc<Mutex<Vec<AuditEvent>>>,
    lock_ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_ttl(std::time::Duration::from_secs(DEFAULT_LOCK_TTL_SECS))
    }

    /// Build a store whose `finalizing` locks become reclaimable after `ttl`.
    pub fn with_lock_ttl(ttl: std::time::Duration) -> Self {
        Self {
            orders: Table::new(),
            ips: Table::new(),
            batches: Table::new(),
            disputes: Table::new(),
            audit: Arc::new(Mutex::new(Vec::new())),
            lock_ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(i64::from(u32::MAX))),
        }
    }

    fn update_order<R>(
        &self,
        order_id: &OrderId,
        f: impl FnOnce(&mut LicenseOrder) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.orders
            .try_update(order_id, f)
            .unwrap_or_else(|| Err(StoreError::order_not_found(order_id)))
    }

    /// Number of audit events recorded so far.
    pub fn audit_len(&self) -> usize {
        self.audit.lock().len()
    }
}

fn sorted_by_creation(mut orders: Vec<LicenseOrder>) -> Vec<LicenseOrder> {
    orders.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
    orders
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: LicenseOrder) -> Result<(), StoreError> {
        let id = order.order_id.clone();
        if self.orders.insert_new(id.clone(), order) {
            Ok(())
        } else {
            Err(StoreError::DuplicateOrder(id))
        }
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<LicenseOrder>, StoreError> {
        Ok(self.orders.get(order_id))
    }

    async fn list_by_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<LicenseOrder>, StoreError> {
        Ok(sorted_by_creation(
            self.orders.filter(|o| statuses.contains(&o.status)),
        ))
    }

    async fn list_by_ip(&self, ip_id: &IpId) -> Result<Vec<LicenseOrder>, StoreError> {
        Ok(sorted_by_creation(self.orders.filter(|o| &o.ip_id == ip_id)))
    }

    async fn update_funding_state(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        proof: Option<PaymentProof>,
        confirmations: u32,
    ) -> Result<LicenseOrder, StoreError> {
        let now = Utc::now();
        self.update_order(order_id, |order| {
            order.apply_funding(status, proof, confirmations, now)?;
            Ok(order.clone())
        })
    }

    async fn request_finalization(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<FinalizationLock, StoreError> {
        let ttl = self.lock_ttl;
        self.update_order(order_id, |order| Ok(order.try_lock(now, ttl)))
    }

    async fn save_evidence_payload(
        &self,
        order_id: &OrderId,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.update_order(order_id, |order| {
            order.evidence_payload = Some(payload.clone());
            order.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn mark_completed(
        &self,
        order_id: &OrderId,
        completion: OrderCompletion,
    ) -> Result<(), StoreError> {
        self.update_order(order_id, |order| Ok(order.complete(completion)?))
    }

    async fn mark_finalization_failed(
        &self,
        order_id: &OrderId,
        granted_at: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.update_order(order_id, |order| Ok(order.fail(message, granted_at, now)?))
    }

    async fn set_owner(
        &self,
        order_id: &OrderId,
        owner: &Principal,
    ) -> Result<bool, StoreError> {
        self.update_order(order_id, |order| {
            if order.owner_principal.is_some() {
                return Ok(false);
            }
            order.owner_principal = Some(owner.clone());
            Ok(true)
        })
    }

    async fn update_compliance(
        &self,
        order_id: &OrderId,
        compliance_score: u8,
        training_units: u64,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        self.update_order(order_id, |order| {
            Ok(order.rescore(compliance_score, training_units, now))
        })
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_ip(&self, ip: IpAsset) -> Result<(), StoreError> {
        let id = ip.ip_id.clone();
        if self.ips.insert_new(id.clone(), ip) {
            Ok(())
        } else {
            Err(StoreError::DuplicateRecord {
                kind: ResourceKind::IpAsset,
                id: id.to_string(),
            })
        }
    }

    async fn get_ip(&self, ip_id: &IpId) -> Result<Option<IpAsset>, StoreError> {
        Ok(self.ips.get(ip_id))
    }

    async fn insert_training_batch(&self, batch: TrainingBatch) -> Result<(), StoreError> {
        let id = batch.batch_id;
        if self.batches.insert_new(id, batch) {
            Ok(())
        } else {
            Err(StoreError::DuplicateRecord {
                kind: ResourceKind::TrainingBatch,
                id: id.to_string(),
            })
        }
    }

    async fn get_training_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Option<TrainingBatch>, StoreError> {
        Ok(self.batches.get(&batch_id))
    }

    async fn list_training_batches(&self, ip_id: &IpId) -> Result<Vec<TrainingBatch>, StoreError> {
        let mut batches = self.batches.filter(|b| &b.ip_id == ip_id);
        batches.sort_by_key(|b| b.created_at);
        Ok(batches)
    }

    async fn insert_dispute(&self, dispute: Dispute) -> Result<(), StoreError> {
        let id = dispute.dispute_id;
        if self.disputes.insert_new(id, dispute) {
            Ok(())
        } else {
            Err(StoreError::DuplicateRecord {
                kind: ResourceKind::Dispute,
                id: id.to_string(),
            })
        }
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, StoreError> {
        Ok(self.disputes.get(&dispute_id))
    }

    async fn update_dispute(&self, dispute: &Dispute) -> Result<(), StoreError> {
        self.disputes
            .try_update(&dispute.dispute_id, |stored| {
                stored.status = dispute.status;
                stored.updated_at = dispute.updated_at;
                Ok(())
            })
            .unwrap_or_else(|| {
                Err(StoreError::NotFound {
                    kind: ResourceKind::Dispute,
                    id: dispute.dispute_id.to_string(),
                })
            })
    }

    async fn set_record_owner(
        &self,
        kind: ResourceKind,
        id: &str,
        owner: &Principal,
    ) -> Result<bool, StoreError> {
        let not_found = || StoreError::NotFound {
            kind,
            id: id.to_string(),
        };
        let backfill = |slot: &mut Option<Principal>| -> Result<bool, StoreError> {
            if slot.is_some() {
                return Ok(false);
            }
            *slot = Some(owner.clone());
            Ok(true)
        };
        match kind {
            ResourceKind::IpAsset => {
                let ip_id = IpId::new(id).map_err(|_| not_found())?;
                self.ips
                    .try_update(&ip_id, |ip| backfill(&mut ip.owner_principal))
                    .unwrap_or_else(|| Err(not_found()))
            }
            ResourceKind::TrainingBatch => {
                let batch_id = Uuid::parse_str(id).map_err(|_| not_found())?;
                self.batches
                    .try_update(&batch_id, |b| backfill(&mut b.owner_principal))
                    .unwrap_or_else(|| Err(not_found()))
            }
            ResourceKind::Dispute => {
                let dispute_id = Uuid::parse_str(id).map_err(|_| not_found())?;
                self.disputes
                    .try_update(&dispute_id, |d| backfill(&mut d.owner_principal))
                    .unwrap_or_else(|| Err(not_found()))
            }
            ResourceKind::LicenseOrder => {
                let order_id = OrderId::new(id).map_err(|_| not_found())?;
                self.update_order(&order_id, |o| backfill(&mut o.owner_principal))
            }
        }
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append(
        &self,
        action: AuditAction,
        kind: ResourceKind,
        resource_id: &str,
        actor: &Principal,
        payload: serde_json::Value,
    ) -> Result<AuditEvent, StoreError> {
        let mut log = self.audit.lock();
        let previous = log
            .last()
            .map(|e| e.event_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let event = AuditEvent::chained(
            &previous,
            action,
            kind,
            resource_id,
            actor.clone(),
            payload,
            Utc::now(),
        )?;
        log.push(event.clone());
        Ok(event)
    }

    async fn events_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .audit
            .lock()
            .iter()
            .filter(|e| e.resource_kind == kind && e.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn verify_chain(&self, limit: usize) -> Result<ChainIntegrity, StoreError> {
        let log = self.audit.lock();
        let end = limit.min(log.len());
        Ok(verify_chain(&log[..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexlink_core::EvmAddress;
    use lexlink_state::{
        AnchorOutcome, FinalizedEvidence, Network, NewOrder, PaymentMode,
    };

    fn order(id: &str) -> LicenseOrder {
        LicenseOrder::new_pending(
            NewOrder {
                order_id: OrderId::new(id).unwrap(),
                ip_id: IpId::new("ip-1").unwrap(),
                buyer_principal: None,
                mint_to: EvmAddress::parse("0x00000000000000000000000000000000000000aa")
                    .unwrap(),
                payment_mode: PaymentMode::Btc,
                amount_sats: 250_000,
                network: Network::Testnet,
                btc_address: Some("tb1qescrowaddress0000000000000000000".into()),
                owner_principal: None,
            },
            "escrow-owner",
            Utc::now(),
        )
        .unwrap()
    }

    fn completion(lock_granted_at: DateTime<Utc>) -> OrderCompletion {
        OrderCompletion {
            evidence: FinalizedEvidence {
                token_on_chain_id: "1".into(),
                attestation_hash: "a".repeat(64),
                content_hash: "c".repeat(64),
                evidence_hash: "e".repeat(64),
                anchor: AnchorOutcome::Ok {
                    tx_ref: "tx".into(),
                    explorer_url: None,
                },
                archive_hash: "f".repeat(64),
                archive_uri: Some("ipfs://archive".into()),
                archive_file_name: "o.zip".into(),
                vc_document: serde_json::json!({}),
                vc_hash: "d".repeat(64),
                compliance_score: 100,
                training_units: 0,
            },
            owner_principal: Some(Principal::new("creator-1").unwrap()),
            payment_proof: None,
            completed_at: Utc::now(),
            lock_granted_at,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.insert(order("o-1")).await.unwrap();
        let err = store.insert(order("o-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOrder(_)));
    }

    #[tokio::test]
    async fn funding_update_rejects_backward_move() {
        let store = MemoryStore::new();
        let id = OrderId::new("o-1").unwrap();
        store.insert(order("o-1")).await.unwrap();
        store
            .update_funding_state(&id, OrderStatus::Confirmed, None, 1)
            .await
            .unwrap();
        let err = store
            .update_funding_state(&id, OrderStatus::Funded, None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn lock_then_complete_then_relock_refused() {
        let store = MemoryStore::new();
        let id = OrderId::new("o-1").unwrap();
        store.insert(order("o-1")).await.unwrap();

        let lock = store.request_finalization(&id, Utc::now()).await.unwrap();
        assert!(lock.proceed);
        store
            .mark_completed(&id, completion(lock.granted_at.unwrap()))
            .await
            .unwrap();

        let lock = store.request_finalization(&id, Utc::now()).await.unwrap();
        assert!(!lock.proceed);
        assert_eq!(lock.status, OrderStatus::Finalized);
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.owner_principal.unwrap().as_str(), "creator-1");
    }

    #[tokio::test]
    async fn failed_order_can_be_relocked() {
        let store = MemoryStore::new();
        let id = OrderId::new("o-1").unwrap();
        store.insert(order("o-1")).await.unwrap();
        let lock = store.request_finalization(&id, Utc::now()).await.unwrap();
        store
            .mark_finalization_failed(&id, lock.granted_at.unwrap(), "boom")
            .await
            .unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
        assert!(store.request_finalization(&id, Utc::now()).await.unwrap().proceed);
    }

    #[tokio::test]
    async fn stale_lock_reclaimed_after_ttl() {
        let store = MemoryStore::with_lock_ttl(std::time::Duration::from_secs(60));
        let id = OrderId::new("o-1").unwrap();
        store.insert(order("o-1")).await.unwrap();
        let t0 = Utc::now();
        assert!(store.request_finalization(&id, t0).await.unwrap().proceed);
        assert!(!store
            .request_finalization(&id, t0 + Duration::seconds(30))
            .await
            .unwrap()
            .proceed);
        assert!(store
            .request_finalization(&id, t0 + Duration::seconds(61))
            .await
            .unwrap()
            .proceed);
    }

    #[tokio::test]
    async fn reclaimed_lock_rejects_stale_commit() {
        let store = MemoryStore::with_lock_ttl(std::time::Duration::from_secs(60));
        let id = OrderId::new("o-1").unwrap();
        store.insert(order("o-1")).await.unwrap();
        let t0 = Utc::now();
        let stale = store.request_finalization(&id, t0).await.unwrap();
        let fresh = store
            .request_finalization(&id, t0 + Duration::seconds(61))
            .await
            .unwrap();
        assert!(fresh.proceed);

        let stale_at = stale.granted_at.unwrap();
        let err = store
            .mark_finalization_failed(&id, stale_at, "late failure")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        let err = store
            .mark_completed(&id, completion(stale_at))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Finalizing);
        assert!(stored.last_error.is_none());
        store
            .mark_completed(&id, completion(fresh.granted_at.unwrap()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .request_finalization(&OrderId::new("nope").unwrap(), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_owner_never_overwrites() {
        let store = MemoryStore::new();
        let id = OrderId::new("o-1").unwrap();
        store.insert(order("o-1")).await.unwrap();
        let a = Principal::new("a").unwrap();
        let b = Principal::new("b").unwrap();
        assert!(store.set_owner(&id, &a).await.unwrap());
        assert!(!store.set_owner(&id, &b).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().owner_principal, Some(a));
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = MemoryStore::new();
        store.insert(order("o-1")).await.unwrap();
        store.insert(order("o-2")).await.unwrap();
        store
            .request_finalization(&OrderId::new("o-2").unwrap(), Utc::now())
            .await
            .unwrap();
        let pending = store
            .list_by_status(&OrderStatus::POLL_CANDIDATES)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id.as_str(), "o-1");
    }

    #[tokio::test]
    async fn audit_chain_is_valid_and_searchable() {
        let store = MemoryStore::new();
        let actor = Principal::new("creator-1").unwrap();
        store
            .append(
                AuditAction::IpRegistered,
                ResourceKind::IpAsset,
                "ip-1",
                &actor,
                serde_json::json!({}),
            )
            .await
            .unwrap();
        store
            .append(
                AuditAction::LicenseOrderCreated,
                ResourceKind::LicenseOrder,
                "o-1",
                &actor,
                serde_json::json!({"amountSats": 250000}),
            )
            .await
            .unwrap();
        let integrity = store.verify_chain(100).await.unwrap();
        assert!(integrity.chain_valid);
        assert_eq!(integrity.total_events, 2);

        let creation = store
            .find_creation_event(ResourceKind::LicenseOrder, "o-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creation.actor_principal, actor);
        assert!(store
            .find_creation_event(ResourceKind::Dispute, "o-1")
            .await
            .unwrap()
            .is_none());
    }
}
