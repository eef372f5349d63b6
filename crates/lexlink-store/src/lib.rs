//! # lexlink-store: Persistence
//!
//! Three async traits cover everything LexLink persists:
//!
//! - [`OrderStore`]: license orders, including `request_finalization`,
//!   the atomic check-and-set that guarantees at most one finalization saga
//!   runs per order.
//! - [`RecordStore`]: IP assets, training batches and disputes.
//! - [`AuditLog`]: the append-only, hash-chained audit trail.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: `parking_lot::RwLock` tables. The lock never spans an
//!   `.await`, and every check-and-set runs inside one write guard.
//! - [`PgStore`]: PostgreSQL via SQLx. The finalization lock is a single
//!   `UPDATE ... WHERE status NOT IN ('finalizing', 'finalized') RETURNING`.
//!
//! The API selects `PgStore` when `DATABASE_URL` is set, otherwise
//! `MemoryStore`.

pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lexlink_core::{IpId, OrderId, Principal};
use lexlink_state::{
    AuditAction, AuditEvent, ChainIntegrity, Dispute, FinalizationLock, IpAsset, LicenseOrder,
    OrderCompletion, OrderStatus, PaymentProof, ResourceKind, TrainingBatch,
};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::{init_pool, PgStore};

/// Default age after which a `finalizing` lock may be reclaimed.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 900;

/// Durable license orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. Fails with [`StoreError::DuplicateOrder`] when
    /// the id exists.
    async fn insert(&self, order: LicenseOrder) -> Result<(), StoreError>;

    async fn get(&self, order_id: &OrderId) -> Result<Option<LicenseOrder>, StoreError>;

    /// Orders whose status is one of `statuses`, oldest first.
    async fn list_by_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<LicenseOrder>, StoreError>;

    async fn list_by_ip(&self, ip_id: &IpId) -> Result<Vec<LicenseOrder>, StoreError>;

    /// Patch payment-detection fields. Backward moves are rejected with
    /// [`StoreError::InvalidTransition`].
    async fn update_funding_state(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        proof: Option<PaymentProof>,
        confirmations: u32,
    ) -> Result<LicenseOrder, StoreError>;

    /// Atomically move the order to `finalizing` unless it is already
    /// `finalizing` (with a fresh lock) or `finalized`.
    async fn request_finalization(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<FinalizationLock, StoreError>;

    /// Store the raw evidence payload. Callers treat failure as non-fatal.
    async fn save_evidence_payload(
        &self,
        order_id: &OrderId,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Commit a successful finalization. Fails with
    /// [`StoreError::InvalidTransition`] unless the order still holds the
    /// lock named by `completion.lock_granted_at`.
    async fn mark_completed(
        &self,
        order_id: &OrderId,
        completion: OrderCompletion,
    ) -> Result<(), StoreError>;

    /// Release the lock granted at `granted_at` after a failed saga. A
    /// reclaimed lock is left alone.
    async fn mark_finalization_failed(
        &self,
        order_id: &OrderId,
        granted_at: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Backfill the owner. Never overwrites an existing owner; returns
    /// whether a write happened.
    async fn set_owner(&self, order_id: &OrderId, owner: &Principal)
        -> Result<bool, StoreError>;

    /// Refresh the compliance score of a finalized order. Returns false for
    /// orders that are not finalized.
    async fn update_compliance(
        &self,
        order_id: &OrderId,
        compliance_score: u8,
        training_units: u64,
    ) -> Result<bool, StoreError>;
}

/// IP assets, training batches and disputes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_ip(&self, ip: IpAsset) -> Result<(), StoreError>;
    async fn get_ip(&self, ip_id: &IpId) -> Result<Option<IpAsset>, StoreError>;

    async fn insert_training_batch(&self, batch: TrainingBatch) -> Result<(), StoreError>;
    async fn get_training_batch(&self, batch_id: Uuid)
        -> Result<Option<TrainingBatch>, StoreError>;
    async fn list_training_batches(&self, ip_id: &IpId) -> Result<Vec<TrainingBatch>, StoreError>;

    /// Sum of recorded units for an IP asset.
    async fn training_units_for(&self, ip_id: &IpId) -> Result<u64, StoreError> {
        let batches = self.list_training_batches(ip_id).await?;
        Ok(batches
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.units)))
    }

    async fn insert_dispute(&self, dispute: Dispute) -> Result<(), StoreError>;
    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, StoreError>;
    /// Overwrite a dispute's status fields.
    async fn update_dispute(&self, dispute: &Dispute) -> Result<(), StoreError>;

    /// Backfill the owner of an IP asset, training batch or dispute. Never
    /// overwrites an existing owner. License orders go through
    /// [`OrderStore::set_owner`].
    async fn set_record_owner(
        &self,
        kind: ResourceKind,
        id: &str,
        owner: &Principal,
    ) -> Result<bool, StoreError>;
}

/// The append-only audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an event, chaining it to the latest one.
    async fn append(
        &self,
        action: AuditAction,
        kind: ResourceKind,
        resource_id: &str,
        actor: &Principal,
        payload: serde_json::Value,
    ) -> Result<AuditEvent, StoreError>;

    /// Events for one resource, oldest first.
    async fn events_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError>;

    /// The event that recorded the creation of a resource.
    async fn find_creation_event(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<Option<AuditEvent>, StoreError> {
        let action = kind.creation_action();
        Ok(self
            .events_for_resource(kind, resource_id)
            .await?
            .into_iter()
            .find(|e| e.action == action))
    }

    /// Walk the first `limit` events and check hash continuity.
    async fn verify_chain(&self, limit: usize) -> Result<ChainIntegrity, StoreError>;
}
