//! # lexlink-finalize: License Finalization
//!
//! The engineered core of LexLink: turning a paid license order into a
//! minted license token with hashed, anchored, archived and credentialed
//! evidence, exactly once per order.
//!
//! ## Components
//!
//! - [`capability`]: traits for every external system the saga calls.
//! - [`mint`]: the mint step with bounded retry on nonce conflicts.
//! - [`orchestrator`]: the ten-step saga and its failure path.
//! - [`poller`]: escrow scanning that drives orders into the saga.
//! - [`ownership`]: owner resolution with backfill, and authorization.
//! - [`intake`], [`training`], [`disputes`]: record creation around the
//!   saga, each with its audit event.
//!
//! ## Mutual Exclusion
//!
//! The saga never runs without the lock returned by
//! `OrderStore::request_finalization`. [`Finalizer::lock_and_finalize`]
//! is the only entry point; it acquires the lock and commits or releases
//! it under the `finalizing_since` instant it was granted.

pub mod capability;
pub mod config;
pub mod disputes;
pub mod error;
pub mod intake;
pub mod mint;
pub mod orchestrator;
pub mod ownership;
pub mod poller;
pub mod training;

pub use capability::{
    AddressFunding, ArchiveBuilder, ArchiveInput, AttestationSource, BlockExplorer, BuiltArchive,
    CapabilityError, ContentStore, CredentialIssuer, CredentialRequest, DisabledAnchor,
    EvidenceAnchor, IssuedCredential, LedgerAccount, LedgerClient, LicenseMinter, MediaFetcher,
    MintReceipt, MintRequest, PaymentVerifier,
};
pub use config::{ConfigError, FinalizeConfig};
pub use disputes::DisputeDesk;
pub use error::FinalizeError;
pub use intake::Intake;
pub use mint::{is_nonce_conflict, mint_with_retry, MintError, MintOutcome, MintPolicy};
pub use orchestrator::{Capabilities, FinalizationResult, FinalizeOutcome, Finalizer};
pub use ownership::{AccessError, OwnershipResolver};
pub use poller::{FundingPoller, OrderPollResult, PollOutcome, PollSummary};
pub use training::{TrainingRecord, TrainingRecorder};
