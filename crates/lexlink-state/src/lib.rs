//! # lexlink-state: Domain Records and State Machines
//!
//! Every persisted LexLink record lives here, together with the rules that
//! govern how it may change:
//!
//! - [`order`]: the license order lifecycle
//!   (`pending → funded → confirmed → finalizing → finalized`, with the
//!   `finalizing → failed` escape), payment proofs, escrow targets and the
//!   finalized evidence bundle.
//! - [`subaccount`]: deterministic ledger escrow subaccounts.
//! - [`compliance`]: the 0–100 compliance score.
//! - [`network`]: Bitcoin network selection and confirmation thresholds.
//! - [`records`]: IP assets, training batches, disputes and audit events.
//! - [`actor`]: the explicit caller identity threaded through every entry
//!   point.
//!
//! Nothing in this crate performs I/O. Stores and orchestrators in the
//! downstream crates call these transition methods so the rules are written
//! exactly once.

pub mod actor;
pub mod compliance;
pub mod network;
pub mod order;
pub mod records;
pub mod subaccount;

pub use actor::{Actor, Role};
pub use compliance::{ComplianceInputs, MAX_SCORE};
pub use network::Network;
pub use order::{
    AnchorOutcome, EscrowTarget, FinalizationLock, FinalizedEvidence, LicenseOrder, NewOrder,
    OrderCompletion, OrderStatus, PaymentMode, PaymentProof, TransitionError,
};
pub use records::{
    verify_chain, AuditAction, AuditEvent, ChainIntegrity, Creator, Dispute, DisputeStatus,
    DisputeTransitionError, IpAsset, NewIpAsset, ResourceKind, TrainingBatch, GENESIS_HASH,
    MAX_ROYALTY_BPS,
};
pub use subaccount::Subaccount;
