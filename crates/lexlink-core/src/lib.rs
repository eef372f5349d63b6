//! # lexlink-core: Foundational Types for LexLink
//!
//! Every other crate in the workspace depends on `lexlink-core`; it depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `OrderId`, `IpId`, `Principal`,
//!    `EvmAddress` are validated newtypes. An order id cannot be passed where
//!    an IP id is expected.
//!
//! 2. **`CanonicalBytes` newtype.** Evidence payloads, attestations and
//!    credentials are hashed only after JCS canonicalization, so the same
//!    evidence always yields the same digest.
//!
//! 3. **Two hashing entry points.** [`sha256_hex`] for canonical JSON and
//!    [`sha256_bytes_hex`] for opaque media bytes. Nothing else computes
//!    evidence digests.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `lexlink-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_bytes_hex, sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, ValidationError};
pub use identity::{EvmAddress, IpId, OrderId, Principal, SYSTEM_PRINCIPAL};
