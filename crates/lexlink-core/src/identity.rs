//! # Domain Identity Newtypes
//!
//! Newtype wrappers for LexLink identifiers. These prevent accidental
//! identifier confusion: an `OrderId` cannot be passed where an `IpId` is
//! expected, and an `EvmAddress` is always `0x` followed by 40 lowercase
//! hex characters.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const MAX_ID_LEN: usize = 128;

/// The principal used for automated work (poller ticks, backfills).
pub const SYSTEM_PRINCIPAL: &str = "lexlink-system";

fn validate_opaque_id(kind: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            reason: "must not be empty".into(),
        });
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            reason: format!("must not exceed {MAX_ID_LEN} characters"),
        });
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
    {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            reason: "only ASCII letters, digits, '-', '_', ':' and '.' are allowed".into(),
        });
    }
    Ok(trimmed.to_string())
}

/// Client-generated, globally unique license order identifier.
///
/// Immutable once an order is created; the escrow subaccount is derived
/// from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Validate and wrap an order identifier.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate_opaque_id("order id", raw.as_ref()).map(Self)
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a registered IP asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpId(String);

impl IpId {
    /// Validate and wrap an IP asset identifier.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate_opaque_id("ip id", raw.as_ref()).map(Self)
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An authenticated principal (operator, creator, buyer or service account).
///
/// Principals are opaque text; the authentication layer decides their
/// format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wrap a principal, rejecting empty text.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidIdentifier {
                kind: "principal",
                reason: "must not be empty".into(),
            });
        }
        if trimmed.len() > 256 {
            return Err(ValidationError::InvalidIdentifier {
                kind: "principal",
                reason: "must not exceed 256 characters".into(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The well-known principal of automated jobs.
    pub fn system() -> Self {
        Self(SYSTEM_PRINCIPAL.to_string())
    }

    /// The principal as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An EVM-style account address: `0x` + 40 hex characters, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvmAddress(String);

impl EvmAddress {
    /// Parse and normalize an address.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = raw.as_ref().trim();
        let hex = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| ValidationError::InvalidIdentifier {
                kind: "address",
                reason: "must start with 0x".into(),
            })?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidIdentifier {
                kind: "address",
                reason: "must be 0x followed by 40 hex characters".into(),
            });
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// The normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

impl_display!(OrderId, IpId, Principal, EvmAddress);
