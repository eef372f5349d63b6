//! Store error taxonomy.

use thiserror::Error;

use lexlink_core::{CanonicalizationError, OrderId};
use lexlink_state::order::TransitionError;
use lexlink_state::records::DisputeTransitionError;
use lexlink_state::ResourceKind;

/// Errors from the order, record and audit stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An order with this id already exists.
    #[error("order {0} already exists")]
    DuplicateOrder(OrderId),

    /// A non-order record with this id already exists.
    #[error("{kind} {id} already exists")]
    DuplicateRecord { kind: ResourceKind, id: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    /// The requested status change is not an edge of the order state machine.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    InvalidDisputeTransition(#[from] DisputeTransitionError),

    /// A stored row could not be decoded into a domain record.
    #[error("corrupt {kind} record {id}: {reason}")]
    Corrupt {
        kind: ResourceKind,
        id: String,
        reason: String,
    },

    #[error("audit hash computation failed: {0}")]
    AuditHash(#[from] CanonicalizationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn order_not_found(order_id: &OrderId) -> Self {
        Self::NotFound {
            kind: ResourceKind::LicenseOrder,
            id: order_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
