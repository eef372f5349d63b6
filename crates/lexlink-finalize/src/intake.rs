//! IP registration and order creation.
//!
//! Both validate through the `lexlink-state` constructors, persist, and
//! append the creation event the ownership resolver falls back on.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use lexlink_core::ValidationError;
use lexlink_state::{
    Actor, AuditAction, IpAsset, LicenseOrder, NewIpAsset, NewOrder, ResourceKind,
};
use lexlink_store::{AuditLog, OrderStore, RecordStore};

use crate::error::FinalizeError;

#[derive(Clone)]
pub struct Intake {
    orders: Arc<dyn OrderStore>,
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
    /// Ledger account owning every `ckbtc` escrow subaccount.
    ckbtc_escrow_owner: String,
}

impl Intake {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        records: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditLog>,
        ckbtc_escrow_owner: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            records,
            audit,
            ckbtc_escrow_owner: ckbtc_escrow_owner.into(),
        }
    }

    /// Register an IP asset owned by `actor`. Parents must already exist.
    pub async fn register_ip(
        &self,
        actor: &Actor,
        input: NewIpAsset,
    ) -> Result<IpAsset, FinalizeError> {
        for parent in &input.parent_ip_ids {
            if self.records.get_ip(parent).await?.is_none() {
                return Err(ValidationError::field(
                    "parent_ip_ids",
                    format!("unknown parent {parent}"),
                )
                .into());
            }
        }
        let ip = IpAsset::register(input, Some(actor.principal.clone()), Utc::now())?;
        self.records.insert_ip(ip.clone()).await?;

        self.audit_created(
            actor,
            AuditAction::IpRegistered,
            ResourceKind::IpAsset,
            ip.ip_id.as_str(),
            json!({
                "title": ip.title,
                "licenseTermsId": ip.license_terms_id,
                "royaltyBps": ip.royalty_bps,
                "creators": ip.creators.len(),
                "contentHash": ip.content_hash,
            }),
        )
        .await;
        tracing::info!(ip_id = %ip.ip_id, owner = %actor.principal, "IP asset registered");
        Ok(ip)
    }

    /// Create a `pending` order against an existing IP asset. The order
    /// inherits the asset's owner unless one is given.
    pub async fn create_order(
        &self,
        actor: &Actor,
        mut input: NewOrder,
    ) -> Result<LicenseOrder, FinalizeError> {
        let ip = self
            .records
            .get_ip(&input.ip_id)
            .await?
            .ok_or_else(|| FinalizeError::IpNotFound(input.ip_id.clone()))?;
        if input.owner_principal.is_none() {
            input.owner_principal = ip.owner_principal.clone();
        }
        let order = LicenseOrder::new_pending(input, &self.ckbtc_escrow_owner, Utc::now())?;
        self.orders.insert(order.clone()).await?;

        self.audit_created(
            actor,
            AuditAction::LicenseOrderCreated,
            ResourceKind::LicenseOrder,
            order.order_id.as_str(),
            json!({
                "ipId": order.ip_id,
                "paymentMode": order.payment_mode.as_str(),
                "amountSats": order.amount_sats,
                "network": order.network.as_str(),
                "escrow": order.escrow_address(),
            }),
        )
        .await;
        tracing::info!(
            order_id = %order.order_id,
            ip_id = %order.ip_id,
            mode = %order.payment_mode,
            amount_sats = order.amount_sats,
            "license order created"
        );
        Ok(order)
    }

    async fn audit_created(
        &self,
        actor: &Actor,
        action: AuditAction,
        kind: ResourceKind,
        id: &str,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self
            .audit
            .append(action, kind, id, &actor.principal, payload)
            .await
        {
            tracing::warn!(%kind, id, "creation audit event not recorded: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexlink_core::{EvmAddress, IpId, OrderId, Principal};
    use lexlink_state::{Creator, Network, OrderStatus, PaymentMode, Role};
    use lexlink_store::{MemoryStore, StoreError};

    fn intake(store: &MemoryStore) -> Intake {
        let s = Arc::new(store.clone());
        Intake::new(s.clone(), s.clone(), s, "escrow-owner")
    }

    fn creator() -> Actor {
        Actor::new(Principal::new("creator-1").unwrap(), Role::Creator)
    }

    fn new_ip(id: &str, parents: Vec<IpId>) -> NewIpAsset {
        NewIpAsset {
            ip_id: IpId::new(id).unwrap(),
            title: "Track".into(),
            media_url: "https://media.example/track.mp3".into(),
            license_terms_id: "terms-1".into(),
            royalty_bps: 250,
            commercial_use: true,
            derivatives_allowed: true,
            creators: vec![
                Creator {
                    name: "Ada".into(),
                    contribution_percent: 60,
                },
                Creator {
                    name: "Lin".into(),
                    contribution_percent: 40,
                },
            ],
            parent_ip_ids: parents,
            content_hash: None,
        }
    }

    fn new_order(amount_sats: i64) -> NewOrder {
        NewOrder {
            order_id: OrderId::new("o-1").unwrap(),
            ip_id: IpId::new("ip-1").unwrap(),
            buyer_principal: None,
            mint_to: EvmAddress::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            payment_mode: PaymentMode::Ckbtc,
            amount_sats,
            network: Network::Testnet,
            btc_address: None,
            owner_principal: None,
        }
    }

    #[tokio::test]
    async fn registration_is_owned_and_audited() {
        let store = MemoryStore::new();
        let ip = intake(&store)
            .register_ip(&creator(), new_ip("ip-1", vec![]))
            .await
            .unwrap();
        assert_eq!(ip.owner_principal.unwrap().as_str(), "creator-1");
        let created = store
            .find_creation_event(ResourceKind::IpAsset, "ip-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.actor_principal.as_str(), "creator-1");
    }

    #[tokio::test]
    async fn unknown_parent_rejected() {
        let store = MemoryStore::new();
        let err = intake(&store)
            .register_ip(
                &creator(),
                new_ip("ip-2", vec![IpId::new("ip-missing").unwrap()]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::Validation(_)));
    }

    #[tokio::test]
    async fn order_inherits_ip_owner() {
        let store = MemoryStore::new();
        let intake = intake(&store);
        intake
            .register_ip(&creator(), new_ip("ip-1", vec![]))
            .await
            .unwrap();
        let order = intake
            .create_order(&Actor::system(), new_order(250_000))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.owner_principal.as_ref().unwrap().as_str(), "creator-1");
        assert!(order.escrow_address().starts_with("escrow-owner."));
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        let store = MemoryStore::new();
        let intake = intake(&store);
        intake
            .register_ip(&creator(), new_ip("ip-1", vec![]))
            .await
            .unwrap();
        let err = intake
            .create_order(&creator(), new_order(0))
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_order_rejected() {
        let store = MemoryStore::new();
        let intake = intake(&store);
        intake
            .register_ip(&creator(), new_ip("ip-1", vec![]))
            .await
            .unwrap();
        intake.create_order(&creator(), new_order(1)).await.unwrap();
        let err = intake
            .create_order(&creator(), new_order(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Store(StoreError::DuplicateOrder(_))
        ));
    }

    #[tokio::test]
    async fn order_for_unknown_ip_rejected() {
        let store = MemoryStore::new();
        let err = intake(&store)
            .create_order(&creator(), new_order(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::IpNotFound(_)));
    }
}
