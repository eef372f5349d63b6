//! # Evidence Digests
//!
//! SHA-256 digests for attestation documents, evidence payloads, credentials
//! and raw media bytes.
//!
//! Structured evidence is hashed only through [`CanonicalBytes`], so logically
//! equal JSON always produces the same digest. Media files are opaque byte
//! streams and are hashed as-is with [`sha256_bytes_hex`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// A 32-byte SHA-256 content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// The raw 32-byte digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Wrap raw digest bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Compute a SHA-256 digest from canonical bytes.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    digest_raw(data.as_bytes())
}

/// Compute a SHA-256 hex string from canonical bytes.
pub fn sha256_hex(data: &CanonicalBytes) -> String {
    sha256_digest(data).to_hex()
}

/// Compute a SHA-256 hex string over opaque bytes (media files, archives).
///
/// Input size is not bounded here; upload size limits are enforced by the
/// caller that accepts the bytes.
pub fn sha256_bytes_hex(bytes: &[u8]) -> String {
    digest_raw(bytes).to_hex()
}

fn digest_raw(bytes: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    ContentDigest::new(out)
}
