//! # Supporting Records
//!
//! IP assets, training batches, disputes and the audit trail. All four
//! owned resource kinds carry an optional `owner_principal` that the
//! ownership resolver backfills lazily.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use lexlink_core::{
    sha256_hex, CanonicalBytes, CanonicalizationError, IpId, Principal, ValidationError,
};

use crate::order::AnchorOutcome;

/// Upper bound of `royalty_bps` (100%).
pub const MAX_ROYALTY_BPS: u32 = 10_000;

// ── Resource kinds ───────────────────────────────────────────────────

/// The resource kinds that share the ownership contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    IpAsset,
    LicenseOrder,
    Dispute,
    TrainingBatch,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpAsset => "ip_asset",
            Self::LicenseOrder => "license_order",
            Self::Dispute => "dispute",
            Self::TrainingBatch => "training_batch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ip_asset" => Some(Self::IpAsset),
            "license_order" => Some(Self::LicenseOrder),
            "dispute" => Some(Self::Dispute),
            "training_batch" => Some(Self::TrainingBatch),
            _ => None,
        }
    }

    /// The audit action recorded when a resource of this kind is created.
    pub fn creation_action(&self) -> AuditAction {
        match self {
            Self::IpAsset => AuditAction::IpRegistered,
            Self::LicenseOrder => AuditAction::LicenseOrderCreated,
            Self::Dispute => AuditAction::DisputeRaised,
            Self::TrainingBatch => AuditAction::TrainingBatchRecorded,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── IP assets ────────────────────────────────────────────────────────

/// A contributor to an IP asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    pub contribution_percent: u8,
}

/// Registration input for an IP asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIpAsset {
    pub ip_id: IpId,
    pub title: String,
    pub media_url: String,
    pub license_terms_id: String,
    pub royalty_bps: u32,
    pub commercial_use: bool,
    pub derivatives_allowed: bool,
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub parent_ip_ids: Vec<IpId>,
    pub content_hash: Option<String>,
}

/// A registered work with licensing terms.
///
/// Terms and hashes are fixed at registration; there is no update path
/// for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAsset {
    pub ip_id: IpId,
    pub title: String,
    pub media_url: String,
    pub license_terms_id: String,
    pub royalty_bps: u32,
    pub commercial_use: bool,
    pub derivatives_allowed: bool,
    pub creators: Vec<Creator>,
    pub parent_ip_ids: Vec<IpId>,
    pub content_hash: Option<String>,
    pub owner_principal: Option<Principal>,
    pub created_at: DateTime<Utc>,
}

impl IpAsset {
    /// Validate registration input.
    pub fn register(
        input: NewIpAsset,
        owner: Option<Principal>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if input.title.trim().is_empty() {
            return Err(ValidationError::field("title", "must not be empty"));
        }
        let media_url = input.media_url.trim();
        if !(media_url.starts_with("https://")
            || media_url.starts_with("http://")
            || media_url.starts_with("ipfs://"))
        {
            return Err(ValidationError::field(
                "media_url",
                "must be an http(s) or ipfs URL",
            ));
        }
        if input.license_terms_id.trim().is_empty() {
            return Err(ValidationError::field(
                "license_terms_id",
                "must not be empty",
            ));
        }
        if input.royalty_bps > MAX_ROYALTY_BPS {
            return Err(ValidationError::field(
                "royalty_bps",
                format!("must not exceed {MAX_ROYALTY_BPS}"),
            ));
        }
        if input.creators.is_empty() {
            return Err(ValidationError::field("creators", "at least one creator"));
        }
        if input.creators.iter().any(|c| c.name.trim().is_empty()) {
            return Err(ValidationError::field("creators", "creator name is empty"));
        }
        let split: u32 = input
            .creators
            .iter()
            .map(|c| u32::from(c.contribution_percent))
            .sum();
        if split != 100 {
            return Err(ValidationError::field(
                "creators",
                format!("contribution_percent must sum to 100, got {split}"),
            ));
        }
        if input.parent_ip_ids.contains(&input.ip_id) {
            return Err(ValidationError::field(
                "parent_ip_ids",
                "an asset cannot be its own parent",
            ));
        }
        if let Some(hash) = &input.content_hash {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ValidationError::field(
                    "content_hash",
                    "must be 64 hex characters",
                ));
            }
        }

        Ok(Self {
            ip_id: input.ip_id,
            title: input.title.trim().to_string(),
            media_url: media_url.to_string(),
            license_terms_id: input.license_terms_id.trim().to_string(),
            royalty_bps: input.royalty_bps,
            commercial_use: input.commercial_use,
            derivatives_allowed: input.derivatives_allowed,
            creators: input.creators,
            parent_ip_ids: input.parent_ip_ids,
            content_hash: input.content_hash.map(|h| h.to_ascii_lowercase()),
            owner_principal: owner,
            created_at: now,
        })
    }
}

// ── Training batches ─────────────────────────────────────────────────

/// An append-only usage record against an IP asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingBatch {
    pub batch_id: Uuid,
    pub ip_id: IpId,
    pub units: u64,
    pub evidence_hash: String,
    pub anchor: AnchorOutcome,
    pub owner_principal: Option<Principal>,
    pub created_at: DateTime<Utc>,
}

impl TrainingBatch {
    pub fn validate_units(units: i64) -> Result<u64, ValidationError> {
        if units <= 0 {
            return Err(ValidationError::field("units", "must be greater than zero"));
        }
        Ok(units as u64)
    }
}

// ── Disputes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    Raised,
    Responded,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raised => "raised",
            Self::Responded => "responded",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raised" => Some(Self::Raised),
            "responded" => Some(Self::Responded),
            "resolved" | "settled" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dispute {dispute_id}: cannot move from {from} to {to}")]
pub struct DisputeTransitionError {
    pub dispute_id: Uuid,
    pub from: DisputeStatus,
    pub to: DisputeStatus,
}

/// An assertion against an IP asset's usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub dispute_id: Uuid,
    pub ip_id: IpId,
    pub status: DisputeStatus,
    pub liveness_seconds: u64,
    pub evidence_hash: String,
    pub owner_principal: Option<Principal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    pub fn raise(
        ip_id: IpId,
        liveness_seconds: u64,
        evidence_hash: String,
        owner: Option<Principal>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if liveness_seconds == 0 {
            return Err(ValidationError::field(
                "liveness_seconds",
                "must be greater than zero",
            ));
        }
        Ok(Self {
            dispute_id: Uuid::new_v4(),
            ip_id,
            status: DisputeStatus::Raised,
            liveness_seconds,
            evidence_hash,
            owner_principal: owner,
            created_at: now,
            updated_at: now,
        })
    }

    /// The instant after which the dispute can no longer be answered.
    pub fn liveness_deadline(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.liveness_seconds).ok()?;
        chrono::Duration::try_seconds(secs).and_then(|d| self.created_at.checked_add_signed(d))
    }

    pub fn respond(&mut self, now: DateTime<Utc>) -> Result<(), DisputeTransitionError> {
        self.transition(DisputeStatus::Responded, now)
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<(), DisputeTransitionError> {
        self.transition(DisputeStatus::Resolved, now)
    }

    fn transition(
        &mut self,
        to: DisputeStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DisputeTransitionError> {
        let allowed = matches!(
            (self.status, to),
            (DisputeStatus::Raised, DisputeStatus::Responded)
                | (DisputeStatus::Raised, DisputeStatus::Resolved)
                | (DisputeStatus::Responded, DisputeStatus::Resolved)
        );
        if !allowed {
            return Err(DisputeTransitionError {
                dispute_id: self.dispute_id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

// ── Audit trail ──────────────────────────────────────────────────────

/// Audit event actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    IpRegistered,
    LicenseOrderCreated,
    LicenseCompleted,
    LicenseFinalizationFailed,
    TrainingBatchRecorded,
    DisputeRaised,
    DisputeResponded,
    DisputeResolved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpRegistered => "IP_REGISTERED",
            Self::LicenseOrderCreated => "LICENSE_ORDER_CREATED",
            Self::LicenseCompleted => "LICENSE_COMPLETED",
            Self::LicenseFinalizationFailed => "LICENSE_FINALIZATION_FAILED",
            Self::TrainingBatchRecorded => "TRAINING_BATCH_RECORDED",
            Self::DisputeRaised => "DISPUTE_RAISED",
            Self::DisputeResponded => "DISPUTE_RESPONDED",
            Self::DisputeResolved => "DISPUTE_RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::IpRegistered,
            Self::LicenseOrderCreated,
            Self::LicenseCompleted,
            Self::LicenseFinalizationFailed,
            Self::TrainingBatchRecorded,
            Self::DisputeRaised,
            Self::DisputeResponded,
            Self::DisputeResolved,
        ]
        .into_iter()
        .find(|a| a.as_str() == s)
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash that starts the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// An immutable audit trail entry.
///
/// Each event's hash covers the previous event's hash, forming a
/// tamper-evident chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub action: AuditAction,
    pub resource_kind: ResourceKind,
    pub resource_id: String,
    pub actor_principal: Principal,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub previous_hash: String,
    pub event_hash: String,
}

impl AuditEvent {
    /// Build the next event of the chain.
    pub fn chained(
        previous_hash: &str,
        action: AuditAction,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        actor_principal: Principal,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CanonicalizationError> {
        let mut event = Self {
            event_id: Uuid::new_v4(),
            action,
            resource_kind,
            resource_id: resource_id.into(),
            actor_principal,
            payload,
            created_at,
            previous_hash: previous_hash.to_string(),
            event_hash: String::new(),
        };
        event.event_hash = event.compute_hash()?;
        Ok(event)
    }

    /// SHA-256 over the canonical form of every field except `event_hash`.
    pub fn compute_hash(&self) -> Result<String, CanonicalizationError> {
        let body = serde_json::json!({
            "previousHash": self.previous_hash,
            "eventId": self.event_id.to_string(),
            "action": self.action.as_str(),
            "resourceKind": self.resource_kind.as_str(),
            "resourceId": self.resource_id,
            "actor": self.actor_principal.as_str(),
            "payload": self.payload,
            "createdAt": self.created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        });
        Ok(sha256_hex(&CanonicalBytes::from_value(body)?))
    }
}

/// Result of walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIntegrity {
    pub total_events: usize,
    pub broken_links: usize,
    pub chain_valid: bool,
}

/// Verify hash continuity and per-event hashes of an ordered event slice.
pub fn verify_chain(events: &[AuditEvent]) -> ChainIntegrity {
    let mut broken_links = 0;
    let mut expected_prev = GENESIS_HASH;
    for event in events {
        let self_consistent = event
            .compute_hash()
            .map(|h| h == event.event_hash)
            .unwrap_or(false);
        if event.previous_hash != expected_prev || !self_consistent {
            broken_links += 1;
        }
        expected_prev = &event.event_hash;
    }
    ChainIntegrity {
        total_events: events.len(),
        broken_links,
        chain_valid: broken_links == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn new_ip(creators: Vec<Creator>, royalty_bps: u32) -> NewIpAsset {
        NewIpAsset {
            ip_id: IpId::new("ip-1").unwrap(),
            title: "Song".into(),
            media_url: "ipfs://bafybeigdyrzt".into(),
            license_terms_id: "terms-1".into(),
            royalty_bps,
            commercial_use: true,
            derivatives_allowed: false,
            creators,
            parent_ip_ids: vec![],
            content_hash: None,
        }
    }

    fn creator(name: &str, pct: u8) -> Creator {
        Creator {
            name: name.into(),
            contribution_percent: pct,
        }
    }

    #[test]
    fn register_accepts_full_split() {
        let ip = IpAsset::register(
            new_ip(vec![creator("a", 60), creator("b", 40)], 500),
            None,
            now(),
        )
        .unwrap();
        assert_eq!(ip.royalty_bps, 500);
    }

    #[test]
    fn register_rejects_partial_split() {
        let err = IpAsset::register(new_ip(vec![creator("a", 60)], 500), None, now())
            .unwrap_err();
        assert!(err.to_string().contains("sum to 100"));
    }

    #[test]
    fn register_rejects_excess_royalty() {
        assert!(IpAsset::register(new_ip(vec![creator("a", 100)], 10_001), None, now()).is_err());
    }

    #[test]
    fn register_rejects_self_parent() {
        let mut input = new_ip(vec![creator("a", 100)], 0);
        input.parent_ip_ids = vec![IpId::new("ip-1").unwrap()];
        assert!(IpAsset::register(input, None, now()).is_err());
    }

    #[test]
    fn training_units_must_be_positive() {
        assert!(TrainingBatch::validate_units(0).is_err());
        assert_eq!(TrainingBatch::validate_units(12).unwrap(), 12);
    }

    #[test]
    fn dispute_transitions() {
        let ip = IpId::new("ip-1").unwrap();
        let mut d = Dispute::raise(ip.clone(), 3600, "h".into(), None, now()).unwrap();
        d.respond(now()).unwrap();
        d.resolve(now()).unwrap();
        assert!(d.respond(now()).is_err());

        let mut direct = Dispute::raise(ip, 3600, "h".into(), None, now()).unwrap();
        direct.resolve(now()).unwrap();
        assert_eq!(direct.status, DisputeStatus::Resolved);
        assert_eq!(
            direct.liveness_deadline(),
            Some(now() + chrono::Duration::seconds(3600))
        );
    }

    #[test]
    fn creation_actions() {
        assert_eq!(
            ResourceKind::LicenseOrder.creation_action().as_str(),
            "LICENSE_ORDER_CREATED"
        );
        assert_eq!(
            AuditAction::parse("TRAINING_BATCH_RECORDED"),
            Some(AuditAction::TrainingBatchRecorded)
        );
    }

    fn event(prev: &str, id: &str) -> AuditEvent {
        AuditEvent::chained(
            prev,
            AuditAction::IpRegistered,
            ResourceKind::IpAsset,
            id,
            Principal::new("creator-1").unwrap(),
            serde_json::json!({"title": "Song"}),
            now(),
        )
        .unwrap()
    }

    #[test]
    fn chain_verifies() {
        let a = event(GENESIS_HASH, "ip-1");
        let b = event(&a.event_hash, "ip-2");
        let result = verify_chain(&[a, b]);
        assert!(result.chain_valid);
        assert_eq!(result.total_events, 2);
    }

    #[test]
    fn tampered_payload_breaks_chain() {
        let a = event(GENESIS_HASH, "ip-1");
        let mut b = event(&a.event_hash, "ip-2");
        b.payload = serde_json::json!({"title": "Forged"});
        let result = verify_chain(&[a, b]);
        assert!(!result.chain_valid);
        assert_eq!(result.broken_links, 1);
    }
}
