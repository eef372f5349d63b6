//! Dispute records: raise, respond, resolve, each audited.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use lexlink_core::{sha256_hex, CanonicalBytes, IpId, ValidationError};
use lexlink_state::{Actor, AuditAction, Dispute, ResourceKind};
use lexlink_store::{AuditLog, RecordStore, StoreError};

use crate::error::FinalizeError;

#[derive(Clone)]
pub struct DisputeDesk {
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLog>,
}

impl DisputeDesk {
    pub fn new(records: Arc<dyn RecordStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self { records, audit }
    }

    /// Raise a dispute against an IP asset. `evidence` is hashed in
    /// canonical form; only the hash is kept.
    pub async fn raise(
        &self,
        actor: &Actor,
        ip_id: &IpId,
        liveness_seconds: u64,
        evidence: serde_json::Value,
    ) -> Result<Dispute, FinalizeError> {
        if self.records.get_ip(ip_id).await?.is_none() {
            return Err(FinalizeError::IpNotFound(ip_id.clone()));
        }
        let evidence_hash = sha256_hex(&CanonicalBytes::from_value(evidence)?);
        let dispute = Dispute::raise(
            ip_id.clone(),
            liveness_seconds,
            evidence_hash,
            Some(actor.principal.clone()),
            Utc::now(),
        )?;
        self.records.insert_dispute(dispute.clone()).await?;
        self.audit_transition(actor, AuditAction::DisputeRaised, &dispute)
            .await;
        Ok(dispute)
    }

    /// Answer a dispute inside its liveness window.
    pub async fn respond(&self, actor: &Actor, dispute_id: Uuid) -> Result<Dispute, FinalizeError> {
        let mut dispute = self.load(dispute_id).await?;
        let now = Utc::now();
        if dispute.liveness_deadline().is_some_and(|deadline| now > deadline) {
            return Err(ValidationError::field("dispute", "liveness window has closed").into());
        }
        dispute.respond(now).map_err(StoreError::from)?;
        self.records.update_dispute(&dispute).await?;
        self.audit_transition(actor, AuditAction::DisputeResponded, &dispute)
            .await;
        Ok(dispute)
    }

    pub async fn resolve(&self, actor: &Actor, dispute_id: Uuid) -> Result<Dispute, FinalizeError> {
        let mut dispute = self.load(dispute_id).await?;
        dispute.resolve(Utc::now()).map_err(StoreError::from)?;
        self.records.update_dispute(&dispute).await?;
        self.audit_transition(actor, AuditAction::DisputeResolved, &dispute)
            .await;
        Ok(dispute)
    }

    async fn load(&self, dispute_id: Uuid) -> Result<Dispute, FinalizeError> {
        self.records
            .get_dispute(dispute_id)
            .await?
            .ok_or_else(|| {
                FinalizeError::Store(StoreError::NotFound {
                    kind: ResourceKind::Dispute,
                    id: dispute_id.to_string(),
                })
            })
    }

    async fn audit_transition(&self, actor: &Actor, action: AuditAction, dispute: &Dispute) {
        let payload = json!({
            "ipId": dispute.ip_id,
            "status": dispute.status.as_str(),
            "evidenceHash": dispute.evidence_hash,
            "livenessSeconds": dispute.liveness_seconds,
        });
        if let Err(e) = self
            .audit
            .append(
                action,
                ResourceKind::Dispute,
                &dispute.dispute_id.to_string(),
                &actor.principal,
                payload,
            )
            .await
        {
            tracing::warn!(dispute_id = %dispute.dispute_id, "dispute audit event not recorded: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexlink_core::Principal;
    use lexlink_state::{Creator, DisputeStatus, IpAsset, NewIpAsset, Role};
    use lexlink_store::MemoryStore;

    async fn desk() -> (MemoryStore, DisputeDesk) {
        let store = MemoryStore::new();
        let ip = IpAsset::register(
            NewIpAsset {
                ip_id: IpId::new("ip-1").unwrap(),
                title: "Song".into(),
                media_url: "https://media.example/a.mp3".into(),
                license_terms_id: "terms-1".into(),
                royalty_bps: 0,
                commercial_use: false,
                derivatives_allowed: false,
                creators: vec![Creator {
                    name: "Ada".into(),
                    contribution_percent: 100,
                }],
                parent_ip_ids: vec![],
                content_hash: None,
            },
            None,
            Utc::now(),
        )
        .unwrap();
        store.insert_ip(ip).await.unwrap();
        let s = Arc::new(store.clone());
        (store, DisputeDesk::new(s.clone(), s))
    }

    fn actor() -> Actor {
        Actor::new(Principal::new("claimant").unwrap(), Role::Creator)
    }

    #[tokio::test]
    async fn raise_respond_resolve() {
        let (store, desk) = desk().await;
        let d = desk
            .raise(&actor(), &IpId::new("ip-1").unwrap(), 3600, json!({"claim": "copy"}))
            .await
            .unwrap();
        assert_eq!(d.status, DisputeStatus::Raised);
        assert_eq!(d.evidence_hash.len(), 64);

        let d = desk.respond(&actor(), d.dispute_id).await.unwrap();
        assert_eq!(d.status, DisputeStatus::Responded);
        let d = desk.resolve(&actor(), d.dispute_id).await.unwrap();
        assert_eq!(d.status, DisputeStatus::Resolved);

        let stored = store.get_dispute(d.dispute_id).await.unwrap().unwrap();
        assert_eq!(stored.status, DisputeStatus::Resolved);
        let events = store
            .events_for_resource(ResourceKind::Dispute, &d.dispute_id.to_string())
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn resolved_dispute_cannot_be_answered() {
        let (_, desk) = desk().await;
        let d = desk
            .raise(&actor(), &IpId::new("ip-1").unwrap(), 3600, json!({}))
            .await
            .unwrap();
        desk.resolve(&actor(), d.dispute_id).await.unwrap();
        let err = desk.respond(&actor(), d.dispute_id).await.unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Store(StoreError::InvalidDisputeTransition(_))
        ));
    }

    #[tokio::test]
    async fn unknown_dispute_is_not_found() {
        let (_, desk) = desk().await;
        let err = desk.resolve(&actor(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Store(ref e) if e.is_not_found()));
    }
}
