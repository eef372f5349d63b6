//! # Escrow Subaccounts
//!
//! Each `ckbtc` order receives payment on its own 32-byte ledger
//! subaccount under the shared escrow owner. The subaccount is a pure
//! function of the order id, so any process can recompute it without
//! consulting stored state.
//!
//! ```text
//! subaccount = SHA-256("lexlink:ckbtc-subaccount:" || order_id)
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lexlink_core::{OrderId, ValidationError};

const DOMAIN_TAG: &[u8] = b"lexlink:ckbtc-subaccount:";

/// A 32-byte ledger subaccount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Subaccount([u8; 32]);

impl Subaccount {
    /// Derive the escrow subaccount for an order.
    pub fn derive(order_id: &OrderId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        hasher.update(order_id.as_str().as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.len() != 64 || !s.is_ascii() {
            return Err(ValidationError::field(
                "subaccount",
                "must be 64 hex characters",
            ));
        }
        let mut out = [0u8; 32];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| {
                ValidationError::field("subaccount", "must be 64 hex characters")
            })?;
        }
        Ok(Self(out))
    }
}

impl std::fmt::Display for Subaccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Subaccount> for String {
    fn from(s: Subaccount) -> Self {
        s.to_hex()
    }
}

impl TryFrom<String> for Subaccount {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> OrderId {
        OrderId::new(s).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = Subaccount::derive(&oid("order-42"));
        let b = Subaccount::derive(&oid("order-42"));
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn distinct_orders_get_distinct_subaccounts() {
        assert_ne!(
            Subaccount::derive(&oid("order-1")),
            Subaccount::derive(&oid("order-2"))
        );
    }

    #[test]
    fn hex_round_trip() {
        let s = Subaccount::derive(&oid("order-7"));
        let hex = s.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Subaccount::from_hex(&hex).unwrap(), s);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(Subaccount::from_hex("abc").is_err());
        assert!(Subaccount::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let s = Subaccount::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Subaccount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
