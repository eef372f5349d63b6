//! # lexlink-vc: License Credentials
//!
//! Ed25519 keys, W3C Verifiable Credentials and the in-process
//! [`LocalCredentialIssuer`] the finalization saga uses for its last step.
//!
//! All signatures are computed over [`lexlink_core::CanonicalBytes`].

pub mod credential;
pub mod issuer;
pub mod keys;

pub use credential::{LicenseCredential, Proof, VcError};
pub use issuer::LocalCredentialIssuer;
pub use keys::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, KeyError};
