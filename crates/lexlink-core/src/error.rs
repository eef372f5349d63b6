//! # Error Types
//!
//! Leaf error types shared across the workspace. All errors use `thiserror`.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be integers (satoshis) or strings.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization or parsing failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Input rejected before any external call is made.
///
/// Messages are surfaced verbatim to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required identifier was empty or malformed.
    #[error("invalid {kind}: {reason}")]
    InvalidIdentifier {
        /// Identifier kind (e.g. "order id").
        kind: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A field failed a business rule.
    #[error("{field}: {reason}")]
    InvalidField {
        /// Field name as seen by API callers.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ValidationError {
    /// Shorthand for a field-level rejection.
    pub fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
