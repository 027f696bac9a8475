//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by the digest functions.
//! Ledger records (asset registrations, product issuances) are hashed
//! through it so that a record always maps to the same hash, whatever
//! field order the producing struct happens to serialize in.
//!
//! ## Rules
//!
//! 1. **Reject floats.** Money crosses this boundary as decimal strings.
//!    A float here means someone bypassed [`crate::Money`].
//! 2. **RFC 8785 output.** `serde_jcs` sorts keys and uses compact
//!    separators.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by JCS canonicalization with float rejection.
///
/// The inner buffer is private; [`CanonicalBytes::new`] is the sole
/// constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if serde cannot represent it.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() && !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(items) => items.iter().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let data = serde_json::json!({
            "type": "product_issuance",
            "record": {"product_id": "p", "license_id": "l"},
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"record":{"license_id":"l","product_id":"p"},"type":"product_issuance"}"#
        );
    }

    #[test]
    fn float_amount_is_rejected() {
        let data = serde_json::json!({"amount": 10.5});
        match CanonicalBytes::new(&data) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 10.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn nested_float_is_rejected() {
        let data = serde_json::json!({"shares": [{"amount": 1}, {"amount": 0.25}]});
        assert!(CanonicalBytes::new(&data).is_err());
    }

    #[test]
    fn decimal_strings_pass_through() {
        let amount = rust_decimal::Decimal::new(1050, 2);
        let data = serde_json::json!({ "amount": amount });
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"amount":"10.50"}"#);
    }

    #[test]
    fn empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert_eq!(cb.len(), 2);
        assert!(!cb.is_empty());
    }
}
