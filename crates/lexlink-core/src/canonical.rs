//! # Canonical Serialization: JCS Byte Production
//!
//! Defines `CanonicalBytes`, the sole construction path for bytes used in
//! evidence digest computation.
//!
//! ## Invariant
//!
//! The inner buffer is private. The only constructors run the coercion
//! pipeline (float rejection) followed by RFC 8785 serialization, so any
//! function that takes `&CanonicalBytes` is guaranteed to hash canonical
//! input. Two evidence payloads with the same logical content always produce
//! the same digest regardless of field insertion order.
//!
//! ## Coercion Rules
//!
//! 1. **Reject floats.** Amounts are integers (satoshis) or strings.
//! 2. **Sorted keys, compact separators** via `serde_jcs`.
//! 3. Timestamps are serialized by the caller as RFC 3339 strings.
//!
//! Documents authored elsewhere (attestations) skip rule 1 and go through
//! [`CanonicalBytes::from_external_json`]: their numbers are formatted per
//! RFC 8785 instead of rejected.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - The only constructors are [`CanonicalBytes::new()`],
///   [`CanonicalBytes::from_value()`], [`CanonicalBytes::from_json_str()`]
///   and [`CanonicalBytes::from_external_json()`].
/// - Outside `from_external_json`, numeric values are integers, never
///   floats.
/// - Serialization uses sorted keys with compact separators (RFC 8785).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::FloatRejected` if the value contains
    /// float numbers, `SerializationFailed` if serialization fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Self::from_value(value)
    }

    /// Construct canonical bytes from an already-built JSON value.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        let coerced = coerce_json_value(value)?;
        let bytes = serialize_canonical(&coerced)?;
        Ok(Self(bytes))
    }

    /// Parse a JSON document from text and canonicalize it, rejecting
    /// floats.
    pub fn from_json_str(text: &str) -> Result<Self, CanonicalizationError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Canonicalize a JSON document produced outside this system.
    ///
    /// Floats are accepted and serialized with RFC 8785 number formatting.
    /// Two documents differing only in whitespace or key order hash
    /// identically.
    pub fn from_external_json(text: &str) -> Result<Self, CanonicalizationError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self(serialize_canonical(&value)?))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn coerce_json_value(value: Value) -> Result<Value, CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(value),
        Value::Number(ref n) => {
            if n.is_f64() && !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(value)
        }
        Value::Object(map) => {
            let mut coerced = serde_json::Map::new();
            for (k, v) in map {
                coerced.insert(k, coerce_json_value(v)?);
            }
            Ok(Value::Object(coerced))
        }
        Value::Array(arr) => {
            let coerced: Result<Vec<_>, _> = arr.into_iter().map(coerce_json_value).collect();
            Ok(Value::Array(coerced?))
        }
    }
}

fn serialize_canonical(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    let s = serde_jcs::to_string(value)?;
    Ok(s.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_keys_compact_separators() {
        let data = serde_json::json!({"orderId": "o-1", "amountSats": 250000, "kind": "LICENSE_COMPLETED"});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"amountSats":250000,"kind":"LICENSE_COMPLETED","orderId":"o-1"}"#
        );
    }

    #[test]
    fn nested_objects_sorted() {
        let data = serde_json::json!({
            "proof": {"txId": "abc", "block": 7},
            "tokens": [3, 2, 1]
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"proof":{"block":7,"txId":"abc"},"tokens":[3,2,1]}"#);
    }

    #[test]
    fn float_rejected() {
        let data = serde_json::json!({"amount": 1.5});
        match CanonicalBytes::new(&data).unwrap_err() {
            CanonicalizationError::FloatRejected(f) => assert_eq!(f, 1.5),
            other => panic!("expected FloatRejected, got: {other}"),
        }
    }

    #[test]
    fn deeply_nested_float_rejected() {
        let data = serde_json::json!({"a": {"b": [{"c": 0.25}]}});
        assert!(CanonicalBytes::new(&data).is_err());
    }

    #[test]
    fn json_text_whitespace_and_order_insensitive() {
        let a = CanonicalBytes::from_json_str(r#"{ "b": 1,  "a": "x" }"#).unwrap();
        let b = CanonicalBytes::from_json_str(r#"{"a":"x","b":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn external_json_keeps_floats() {
        let text = r#"{ "score": 0.5, "attestor": "lab", "weights": [1.25, 2] }"#;
        assert!(CanonicalBytes::from_json_str(text).is_err());
        let cb = CanonicalBytes::from_external_json(text).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"attestor":"lab","score":0.5,"weights":[1.25,2]}"#
        );
    }

    #[test]
    fn external_json_whole_floats_print_as_integers() {
        let a = CanonicalBytes::from_external_json(r#"{"n":1.0}"#).unwrap();
        let b = CanonicalBytes::from_external_json(r#"{"n":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_json_text_is_an_error() {
        assert!(CanonicalBytes::from_external_json("[1,").is_err());
        let err = CanonicalBytes::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, CanonicalizationError::SerializationFailed(_)));
    }

    #[test]
    fn empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert!(!cb.is_empty());
        assert_eq!(cb.len(), 2);
    }

    #[test]
    fn unicode_passthrough() {
        let data = serde_json::json!({"title": "\u{00e9}t\u{00e9}"});
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert!(s.contains('\u{00e9}'));
    }
}
