//! # Ownership Resolution
//!
//! Older records may lack an `owner_principal`. The owner is resolved in
//! this order, first hit wins:
//!
//! 1. the record's own `owner_principal`;
//! 2. for orders, disputes and training batches, the owner of the parent
//!    IP asset (itself resolved through 1 and 3);
//! 3. the actor of the record's creation event in the audit log.
//!
//! A resolved owner is written back so the next lookup hits step 1. A
//! failed write-back is logged and does not affect the answer.
//!
//! Step 2 goes through the IP asset's own step 3: when the parent IP has no
//! owner, the IP's registration event in the audit log decides it. That
//! owner is then persisted on the IP asset as well as on the child record,
//! so resolving an order can backfill its IP asset as a side effect.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use lexlink_core::{IpId, OrderId, Principal};
use lexlink_state::{Actor, ResourceKind};
use lexlink_store::{AuditLog, OrderStore, RecordStore, StoreError};

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("{principal} may not act on {kind} {id}")]
    Forbidden {
        principal: Principal,
        kind: ResourceKind,
        id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct OwnershipResolver {
    orders: Arc<dyn OrderStore>,
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
}

/// A record's stored owner and parent IP.
struct Located {
    owner: Option<Principal>,
    parent_ip: Option<IpId>,
}

impl OwnershipResolver {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            orders,
            records,
            audit,
        }
    }

    /// Resolve the owner of a resource. `NotFound` if the resource itself
    /// does not exist; `Ok(None)` if it exists but no owner can be found.
    pub async fn resolve(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let located = self.locate(kind, id).await?;
        if let Some(owner) = located.owner {
            return Ok(Some(owner));
        }

        let mut resolved = None;
        if let Some(ip_id) = &located.parent_ip {
            match self.resolve_ip(ip_id).await {
                Ok(owner) => resolved = owner,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(%kind, id, ip_id = %ip_id, "parent IP asset missing");
                }
                Err(e) => return Err(e),
            }
        }
        if resolved.is_none() {
            resolved = self.creator_of(kind, id).await?;
        }

        if let Some(owner) = &resolved {
            self.persist(kind, id, owner).await;
        }
        Ok(resolved)
    }

    /// Allow privileged actors and the resolved owner. Ownerless resources
    /// are closed to everyone else.
    pub async fn authorize(
        &self,
        actor: &Actor,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), AccessError> {
        if actor.is_privileged() {
            return Ok(());
        }
        match self.resolve(kind, id).await? {
            Some(owner) if owner == actor.principal => Ok(()),
            _ => Err(AccessError::Forbidden {
                principal: actor.principal.clone(),
                kind,
                id: id.to_string(),
            }),
        }
    }

    async fn resolve_ip(&self, ip_id: &IpId) -> Result<Option<Principal>, StoreError> {
        let ip = self
            .records
            .get_ip(ip_id)
            .await?
            .ok_or_else(|| not_found(ResourceKind::IpAsset, ip_id.as_str()))?;
        if let Some(owner) = ip.owner_principal {
            return Ok(Some(owner));
        }
        let creator = self.creator_of(ResourceKind::IpAsset, ip_id.as_str()).await?;
        if let Some(owner) = &creator {
            self.persist(ResourceKind::IpAsset, ip_id.as_str(), owner)
                .await;
        }
        Ok(creator)
    }

    async fn creator_of(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .audit
            .find_creation_event(kind, id)
            .await?
            .map(|event| event.actor_principal))
    }

    async fn locate(&self, kind: ResourceKind, id: &str) -> Result<Located, StoreError> {
        match kind {
            ResourceKind::IpAsset => {
                let ip_id = IpId::new(id).map_err(|_| not_found(kind, id))?;
                let ip = self
                    .records
                    .get_ip(&ip_id)
                    .await?
                    .ok_or_else(|| not_found(kind, id))?;
                Ok(Located {
                    owner: ip.owner_principal,
                    parent_ip: None,
                })
            }
            ResourceKind::LicenseOrder => {
                let order_id = OrderId::new(id).map_err(|_| not_found(kind, id))?;
                let order = self
                    .orders
                    .get(&order_id)
                    .await?
                    .ok_or_else(|| not_found(kind, id))?;
                Ok(Located {
                    owner: order.owner_principal,
                    parent_ip: Some(order.ip_id),
                })
            }
            ResourceKind::Dispute => {
                let dispute_id = Uuid::parse_str(id).map_err(|_| not_found(kind, id))?;
                let dispute = self
                    .records
                    .get_dispute(dispute_id)
                    .await?
                    .ok_or_else(|| not_found(kind, id))?;
                Ok(Located {
                    owner: dispute.owner_principal,
                    parent_ip: Some(dispute.ip_id),
                })
            }
            ResourceKind::TrainingBatch => {
                let batch_id = Uuid::parse_str(id).map_err(|_| not_found(kind, id))?;
                let batch = self
                    .records
                    .get_training_batch(batch_id)
                    .await?
                    .ok_or_else(|| not_found(kind, id))?;
                Ok(Located {
                    owner: batch.owner_principal,
                    parent_ip: Some(batch.ip_id),
                })
            }
        }
    }

    async fn persist(&self, kind: ResourceKind, id: &str, owner: &Principal) {
        let written = match kind {
            ResourceKind::LicenseOrder => match OrderId::new(id) {
                Ok(order_id) => self.orders.set_owner(&order_id, owner).await,
                Err(e) => {
                    tracing::warn!(%kind, id, "owner not persisted: {e}");
                    return;
                }
            },
            _ => self.records.set_record_owner(kind, id, owner).await,
        };
        match written {
            Ok(true) => tracing::info!(%kind, id, owner = %owner, "owner backfilled"),
            Ok(false) => {}
            Err(e) => tracing::warn!(%kind, id, "owner not persisted: {e}"),
        }
    }
}

fn not_found(kind: ResourceKind, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexlink_core::EvmAddress;
    use lexlink_state::{
        AuditAction, Dispute, IpAsset, LicenseOrder, Network, NewIpAsset, NewOrder, PaymentMode,
        Role, TrainingBatch, AnchorOutcome, Creator,
    };
    use lexlink_store::MemoryStore;

    fn principal(s: &str) -> Principal {
        Principal::new(s).unwrap()
    }

    fn resolver(store: &MemoryStore) -> OwnershipResolver {
        let s = Arc::new(store.clone());
        OwnershipResolver::new(s.clone(), s.clone(), s)
    }

    fn ip(owner: Option<Principal>) -> IpAsset {
        IpAsset::register(
            NewIpAsset {
                ip_id: IpId::new("ip-1").unwrap(),
                title: "Song".into(),
                media_url: "https://media.example/song.mp3".into(),
                license_terms_id: "terms-1".into(),
                royalty_bps: 500,
                commercial_use: true,
                derivatives_allowed: false,
                creators: vec![Creator {
                    name: "Ada".into(),
                    contribution_percent: 100,
                }],
                parent_ip_ids: vec![],
                content_hash: None,
            },
            owner,
            Utc::now(),
        )
        .unwrap()
    }

    fn order(owner: Option<Principal>) -> LicenseOrder {
        LicenseOrder::new_pending(
            NewOrder {
                order_id: OrderId::new("o-1").unwrap(),
                ip_id: IpId::new("ip-1").unwrap(),
                buyer_principal: None,
                mint_to: EvmAddress::parse("0x00000000000000000000000000000000000000aa").unwrap(),
                payment_mode: PaymentMode::Ckbtc,
                amount_sats: 1_000,
                network: Network::Testnet,
                btc_address: None,
                owner_principal: owner,
            },
            "escrow-owner",
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn own_field_wins() {
        let store = MemoryStore::new();
        store.insert_ip(ip(Some(principal("ip-owner")))).await.unwrap();
        store.insert(order(Some(principal("order-owner")))).await.unwrap();
        let owner = resolver(&store)
            .resolve(ResourceKind::LicenseOrder, "o-1")
            .await
            .unwrap();
        assert_eq!(owner, Some(principal("order-owner")));
    }

    #[tokio::test]
    async fn order_inherits_ip_owner_and_persists_it() {
        let store = MemoryStore::new();
        store.insert_ip(ip(Some(principal("ip-owner")))).await.unwrap();
        store.insert(order(None)).await.unwrap();
        let owner = resolver(&store)
            .resolve(ResourceKind::LicenseOrder, "o-1")
            .await
            .unwrap();
        assert_eq!(owner, Some(principal("ip-owner")));
        let stored = store.get(&OrderId::new("o-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.owner_principal, Some(principal("ip-owner")));
    }

    #[tokio::test]
    async fn falls_back_to_creation_event() {
        let store = MemoryStore::new();
        store.insert_ip(ip(None)).await.unwrap();
        store
            .append(
                AuditAction::IpRegistered,
                ResourceKind::IpAsset,
                "ip-1",
                &principal("registrar"),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        let dispute = Dispute::raise(
            IpId::new("ip-1").unwrap(),
            3600,
            "e".repeat(64),
            None,
            Utc::now(),
        )
        .unwrap();
        let dispute_id = dispute.dispute_id.to_string();
        store.insert_dispute(dispute).await.unwrap();

        let r = resolver(&store);
        assert_eq!(
            r.resolve(ResourceKind::Dispute, &dispute_id).await.unwrap(),
            Some(principal("registrar"))
        );
        let ip = store.get_ip(&IpId::new("ip-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(ip.owner_principal, Some(principal("registrar")));
    }

    #[tokio::test]
    async fn order_backfills_ip_owner_from_ip_registration() {
        let store = MemoryStore::new();
        store.insert_ip(ip(None)).await.unwrap();
        store.insert(order(None)).await.unwrap();
        store
            .append(
                AuditAction::IpRegistered,
                ResourceKind::IpAsset,
                "ip-1",
                &principal("registrar"),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let owner = resolver(&store)
            .resolve(ResourceKind::LicenseOrder, "o-1")
            .await
            .unwrap();
        assert_eq!(owner, Some(principal("registrar")));
        let stored = store.get(&OrderId::new("o-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.owner_principal, Some(principal("registrar")));
        let ip = store.get_ip(&IpId::new("ip-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(ip.owner_principal, Some(principal("registrar")));
    }

    #[tokio::test]
    async fn training_batch_without_any_owner_is_unowned() {
        let store = MemoryStore::new();
        store.insert_ip(ip(None)).await.unwrap();
        let batch = TrainingBatch {
            batch_id: Uuid::new_v4(),
            ip_id: IpId::new("ip-1").unwrap(),
            units: 5,
            evidence_hash: "e".repeat(64),
            anchor: AnchorOutcome::Skipped {
                reason: "disabled".into(),
            },
            owner_principal: None,
            created_at: Utc::now(),
        };
        let id = batch.batch_id.to_string();
        store.insert_training_batch(batch).await.unwrap();
        assert_eq!(
            resolver(&store)
                .resolve(ResourceKind::TrainingBatch, &id)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn missing_resource_is_not_found() {
        let store = MemoryStore::new();
        let err = resolver(&store)
            .resolve(ResourceKind::LicenseOrder, "nope")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn authorize_rules() {
        let store = MemoryStore::new();
        store.insert_ip(ip(Some(principal("owner")))).await.unwrap();
        let r = resolver(&store);

        let owner = Actor::new(principal("owner"), Role::Creator);
        let stranger = Actor::new(principal("stranger"), Role::Creator);
        let admin = Actor::new(principal("ops"), Role::Admin);

        r.authorize(&owner, ResourceKind::IpAsset, "ip-1").await.unwrap();
        r.authorize(&admin, ResourceKind::IpAsset, "ip-1").await.unwrap();
        r.authorize(&Actor::system(), ResourceKind::IpAsset, "ip-1")
            .await
            .unwrap();
        let err = r
            .authorize(&stranger, ResourceKind::IpAsset, "ip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn ownerless_resource_is_closed_to_creators() {
        let store = MemoryStore::new();
        store.insert_ip(ip(None)).await.unwrap();
        let creator = Actor::new(principal("anyone"), Role::Creator);
        let err = resolver(&store)
            .authorize(&creator, ResourceKind::IpAsset, "ip-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Forbidden { .. }));
    }
}
