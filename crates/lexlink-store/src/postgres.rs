//! # PostgreSQL Backend
//!
//! Every table stores the full domain record as JSONB next to the scalar
//! columns that queries filter on. For orders, `status`,
//! `finalizing_since` and `updated_at` are authoritative and overlay the
//! JSONB on read.
//!
//! `request_finalization` is one conditional `UPDATE ... RETURNING`; the
//! row lock Postgres takes for the UPDATE serializes concurrent callers and
//! exactly one of them sees an affected row. Other mutations lock the row
//! with `SELECT ... FOR UPDATE`, apply the transition methods from
//! `lexlink-state`, and write the result back in the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use uuid::Uuid;

use lexlink_core::{IpId, OrderId, Principal};
use lexlink_state::records::verify_chain;
use lexlink_state::{
    AuditAction, AuditEvent, ChainIntegrity, Dispute, FinalizationLock, IpAsset, LicenseOrder,
    OrderCompletion, OrderStatus, PaymentProof, ResourceKind, TrainingBatch, GENESIS_HASH,
};

use crate::{AuditLog, OrderStore, RecordStore, StoreError, DEFAULT_LOCK_TTL_SECS};

/// Advisory lock key serializing audit appends (chain integrity).
const AUDIT_CHAIN_LOCK: i64 = 0x4c45_584c_494e_4b;

/// Connect to Postgres and apply the embedded migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");
    Ok(pool)
}

/// Postgres implementation of all three store traits.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_ttl: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_ttl(pool, std::time::Duration::from_secs(DEFAULT_LOCK_TTL_SECS))
    }

    pub fn with_lock_ttl(pool: PgPool, ttl: std::time::Duration) -> Self {
        Self {
            pool,
            lock_ttl: Duration::from_std(ttl)
                .unwrap_or_else(|_| Duration::seconds(i64::from(u32::MAX))),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Lock the order row, apply `f`, and write the order back.
    async fn modify_order<R, F>(&self, order_id: &OrderId, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut LicenseOrder) -> Result<R, StoreError> + Send,
        R: Send,
    {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT order_id, status, finalizing_since, record, updated_at
             FROM license_orders WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::order_not_found(order_id));
        };
        let mut order = row.into_order()?;
        let out = f(&mut order)?;
        write_order(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(out)
    }

    async fn order_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM license_orders WHERE order_id = $1")
                .bind(order_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        status
            .map(|s| {
                OrderStatus::parse(&s).ok_or_else(|| StoreError::Corrupt {
                    kind: ResourceKind::LicenseOrder,
                    id: order_id.to_string(),
                    reason: format!("unknown status '{s}'"),
                })
            })
            .transpose()
    }
}

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    status: String,
    finalizing_since: Option<DateTime<Utc>>,
    record: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<LicenseOrder, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            kind: ResourceKind::LicenseOrder,
            id: self.order_id.clone(),
            reason,
        };
        let status = OrderStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let mut order: LicenseOrder =
            serde_json::from_value(self.record.clone()).map_err(|e| corrupt(e.to_string()))?;
        order.status = status;
        order.finalizing_since = self.finalizing_since;
        order.updated_at = self.updated_at;
        Ok(order)
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    record: serde_json::Value,
}

fn decode_record<T: serde::de::DeserializeOwned>(
    row: RecordRow,
    kind: ResourceKind,
    id: &str,
) -> Result<T, StoreError> {
    serde_json::from_value(row.record).map_err(|e| StoreError::Corrupt {
        kind,
        id: id.to_string(),
        reason: e.to_string(),
    })
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    event_id: Uuid,
    action: String,
    resource_kind: String,
    resource_id: String,
    actor_principal: String,
    payload: serde_json::Value,
    previous_hash: String,
    event_hash: String,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_event(self) -> Result<AuditEvent, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            kind: ResourceKind::parse(&self.resource_kind).unwrap_or(ResourceKind::LicenseOrder),
            id: self.event_id.to_string(),
            reason,
        };
        let action = AuditAction::parse(&self.action)
            .ok_or_else(|| corrupt(format!("unknown action '{}'", self.action)))?;
        let resource_kind = ResourceKind::parse(&self.resource_kind)
            .ok_or_else(|| corrupt(format!("unknown resource kind '{}'", self.resource_kind)))?;
        let actor_principal =
            Principal::new(&self.actor_principal).map_err(|e| corrupt(e.to_string()))?;
        Ok(AuditEvent {
            event_id: self.event_id,
            action,
            resource_kind,
            resource_id: self.resource_id,
            actor_principal,
            payload: self.payload,
            created_at: self.created_at,
            previous_hash: self.previous_hash,
            event_hash: self.event_hash,
        })
    }
}

const AUDIT_COLUMNS: &str = "event_id, action, resource_kind, resource_id, actor_principal, \
                             payload, previous_hash, event_hash, created_at";

async fn write_order(conn: &mut PgConnection, order: &LicenseOrder) -> Result<(), StoreError> {
    let record = serde_json::to_value(order)?;
    sqlx::query(
        "UPDATE license_orders
         SET status = $2, owner_principal = $3, finalizing_since = $4, record = $5, updated_at = $6
         WHERE order_id = $1",
    )
    .bind(order.order_id.as_str())
    .bind(order.status.as_str())
    .bind(order.owner_principal.as_ref().map(|p| p.as_str().to_string()))
    .bind(order.finalizing_since)
    .bind(&record)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

// ── OrderStore ───────────────────────────────────────────────────────

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: LicenseOrder) -> Result<(), StoreError> {
        let record = serde_json::to_value(&order)?;
        let result = sqlx::query(
            "INSERT INTO license_orders (order_id, ip_id, payment_mode, status, owner_principal,
             finalizing_since, record, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (order_id) DO NOTHING",
        )
        .bind(order.order_id.as_str())
        .bind(order.ip_id.as_str())
        .bind(order.payment_mode.as_str())
        .bind(order.status.as_str())
        .bind(order.owner_principal.as_ref().map(|p| p.as_str().to_string()))
        .bind(order.finalizing_since)
        .bind(&record)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateOrder(order.order_id));
        }
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<LicenseOrder>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT order_id, status, finalizing_since, record, updated_at
             FROM license_orders WHERE order_id = $1",
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn list_by_status(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<LicenseOrder>, StoreError> {
        let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT order_id, status, finalizing_since, record, updated_at
             FROM license_orders WHERE status = ANY($1)
             ORDER BY created_at ASC, order_id ASC",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn list_by_ip(&self, ip_id: &IpId) -> Result<Vec<LicenseOrder>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT order_id, status, finalizing_since, record, updated_at
             FROM license_orders WHERE ip_id = $1
             ORDER BY created_at ASC, order_id ASC",
        )
        .bind(ip_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn update_funding_state(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        proof: Option<PaymentProof>,
        confirmations: u32,
    ) -> Result<LicenseOrder, StoreError> {
        let now = Utc::now();
        self.modify_order(order_id, move |order| {
            order.apply_funding(status, proof, confirmations, now)?;
            Ok(order.clone())
        })
        .await
    }

    async fn request_finalization(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<FinalizationLock, StoreError> {
        let stale_before = now - self.lock_ttl;
        let acquired: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            "UPDATE license_orders
             SET status = 'finalizing', finalizing_since = $2, updated_at = $2
             WHERE order_id = $1
               AND (status NOT IN ('finalizing', 'finalized')
                    OR (status = 'finalizing'
                        AND (finalizing_since IS NULL OR finalizing_since <= $3)))
             RETURNING finalizing_since",
        )
        .bind(order_id.as_str())
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        // The stored instant is truncated to microseconds; fence on that.
        if let Some(granted_at) = acquired {
            return Ok(FinalizationLock::granted(granted_at.unwrap_or(now)));
        }
        match self.order_status(order_id).await? {
            Some(status) => Ok(FinalizationLock::refused(status)),
            None => Err(StoreError::order_not_found(order_id)),
        }
    }

    async fn save_evidence_payload(
        &self,
        order_id: &OrderId,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE license_orders
             SET record = jsonb_set(record, '{evidence_payload}', $2), updated_at = $3
             WHERE order_id = $1",
        )
        .bind(order_id.as_str())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::order_not_found(order_id));
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        order_id: &OrderId,
        completion: OrderCompletion,
    ) -> Result<(), StoreError> {
        self.modify_order(order_id, move |order| Ok(order.complete(completion)?))
            .await
    }

    async fn mark_finalization_failed(
        &self,
        order_id: &OrderId,
        granted_at: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let message = message.to_string();
        self.modify_order(order_id, move |order| {
            Ok(order.fail(&message, granted_at, now)?)
        })
        .await
    }

    async fn set_owner(
        &self,
        order_id: &OrderId,
        owner: &Principal,
    ) -> Result<bool, StoreError> {
        self.set_record_owner(ResourceKind::LicenseOrder, order_id.as_str(), owner)
            .await
    }

    async fn update_compliance(
        &self,
        order_id: &OrderId,
        compliance_score: u8,
        training_units: u64,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        self.modify_order(order_id, move |order| {
            Ok(order.rescore(compliance_score, training_units, now))
        })
        .await
    }
}

// ── RecordStore ──────────────────────────────────────────────────────

fn owner_table(kind: ResourceKind) -> (&'static str, &'static str) {
    match kind {
        ResourceKind::IpAsset => ("ip_assets", "ip_id"),
        ResourceKind::LicenseOrder => ("license_orders", "order_id"),
        ResourceKind::Dispute => ("disputes", "dispute_id::text"),
        ResourceKind::TrainingBatch => ("training_batches", "batch_id::text"),
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_ip(&self, ip: IpAsset) -> Result<(), StoreError> {
        let record = serde_json::to_value(&ip)?;
        let result = sqlx::query(
            "INSERT INTO ip_assets (ip_id, owner_principal, record, created_at)
             VALUES ($1, $2, $3, $4) ON CONFLICT (ip_id) DO NOTHING",
        )
        .bind(ip.ip_id.as_str())
        .bind(ip.owner_principal.as_ref().map(|p| p.as_str().to_string()))
        .bind(&record)
        .bind(ip.created_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateRecord {
                kind: ResourceKind::IpAsset,
                id: ip.ip_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_ip(&self, ip_id: &IpId) -> Result<Option<IpAsset>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>("SELECT record FROM ip_assets WHERE ip_id = $1")
            .bind(ip_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_record(r, ResourceKind::IpAsset, ip_id.as_str()))
            .transpose()
    }

    async fn insert_training_batch(&self, batch: TrainingBatch) -> Result<(), StoreError> {
        let record = serde_json::to_value(&batch)?;
        let units = i64::try_from(batch.units).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO training_batches (batch_id, ip_id, units, owner_principal, record, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(batch.batch_id)
        .bind(batch.ip_id.as_str())
        .bind(units)
        .bind(batch.owner_principal.as_ref().map(|p| p.as_str().to_string()))
        .bind(&record)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_training_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Option<TrainingBatch>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT record FROM training_batches WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_record(r, ResourceKind::TrainingBatch, &batch_id.to_string()))
            .transpose()
    }

    async fn list_training_batches(&self, ip_id: &IpId) -> Result<Vec<TrainingBatch>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT record FROM training_batches WHERE ip_id = $1 ORDER BY created_at ASC",
        )
        .bind(ip_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| decode_record(r, ResourceKind::TrainingBatch, ip_id.as_str()))
            .collect()
    }

    async fn training_units_for(&self, ip_id: &IpId) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(units), 0)::BIGINT FROM training_batches WHERE ip_id = $1",
        )
        .bind(ip_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn insert_dispute(&self, dispute: Dispute) -> Result<(), StoreError> {
        let record = serde_json::to_value(&dispute)?;
        sqlx::query(
            "INSERT INTO disputes (dispute_id, ip_id, status, owner_principal, record,
             created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(dispute.dispute_id)
        .bind(dispute.ip_id.as_str())
        .bind(dispute.status.as_str())
        .bind(dispute.owner_principal.as_ref().map(|p| p.as_str().to_string()))
        .bind(&record)
        .bind(dispute.created_at)
        .bind(dispute.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>("SELECT record FROM disputes WHERE dispute_id = $1")
            .bind(dispute_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_record(r, ResourceKind::Dispute, &dispute_id.to_string()))
            .transpose()
    }

    async fn update_dispute(&self, dispute: &Dispute) -> Result<(), StoreError> {
        let record = serde_json::to_value(dispute)?;
        let result = sqlx::query(
            "UPDATE disputes SET status = $2, record = $3, updated_at = $4 WHERE dispute_id = $1",
        )
        .bind(dispute.dispute_id)
        .bind(dispute.status.as_str())
        .bind(&record)
        .bind(dispute.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: ResourceKind::Dispute,
                id: dispute.dispute_id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_record_owner(
        &self,
        kind: ResourceKind,
        id: &str,
        owner: &Principal,
    ) -> Result<bool, StoreError> {
        let (table, key) = owner_table(kind);
        let update = format!(
            "UPDATE {table}
             SET owner_principal = $2,
                 record = jsonb_set(record, '{{owner_principal}}', to_jsonb($2::text))
             WHERE {key} = $1 AND owner_principal IS NULL"
        );
        let result = sqlx::query(&update)
            .bind(id)
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE {key} = $1)");
        let found: bool = sqlx::query_scalar(&exists)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if found {
            Ok(false)
        } else {
            Err(StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
        }
    }
}

// ── AuditLog ─────────────────────────────────────────────────────────

#[async_trait]
impl AuditLog for PgStore {
    async fn append(
        &self,
        action: AuditAction,
        kind: ResourceKind,
        resource_id: &str,
        actor: &Principal,
        payload: serde_json::Value,
    ) -> Result<AuditEvent, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK)
            .execute(&mut *tx)
            .await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT event_hash FROM audit_events ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        let previous = previous.unwrap_or_else(|| GENESIS_HASH.to_string());

        let event = AuditEvent::chained(
            &previous,
            action,
            kind,
            resource_id,
            actor.clone(),
            payload,
            Utc::now(),
        )?;

        sqlx::query(
            "INSERT INTO audit_events (event_id, action, resource_kind, resource_id,
             actor_principal, payload, previous_hash, event_hash, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.event_id)
        .bind(event.action.as_str())
        .bind(event.resource_kind.as_str())
        .bind(&event.resource_id)
        .bind(event.actor_principal.as_str())
        .bind(&event.payload)
        .bind(&event.previous_hash)
        .bind(&event.event_hash)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn events_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let query = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_events
             WHERE resource_kind = $1 AND resource_id = $2 ORDER BY seq ASC"
        );
        let rows = sqlx::query_as::<_, AuditRow>(&query)
            .bind(kind.as_str())
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AuditRow::into_event).collect()
    }

    async fn verify_chain(&self, limit: usize) -> Result<ChainIntegrity, StoreError> {
        let query = format!("SELECT {AUDIT_COLUMNS} FROM audit_events ORDER BY seq ASC LIMIT $1");
        let rows = sqlx::query_as::<_, AuditRow>(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        let events = rows
            .into_iter()
            .map(AuditRow::into_event)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(verify_chain(&events))
    }
}
