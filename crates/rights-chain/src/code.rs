//! # Verification Codes
//!
//! The public handle a buyer uses to check a product's provenance:
//! 32 ASCII alphanumerics drawn from the OS random source. Codes carry no
//! structure; uniqueness is enforced by the index that stores them.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ChainError;

pub const VERIFICATION_CODE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Draw a fresh random code.
    pub fn generate() -> Self {
        let code: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(VERIFICATION_CODE_LEN)
            .map(char::from)
            .collect();
        Self(code)
    }

    /// Validate a code supplied from outside.
    pub fn parse(raw: &str) -> Result<Self, ChainError> {
        let raw = raw.trim();
        if raw.len() != VERIFICATION_CODE_LEN || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ChainError::InvalidCode(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VerificationCode {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VerificationCode> for String {
    fn from(code: VerificationCode) -> Self {
        code.0
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_32_alphanumerics() {
        let code = VerificationCode::generate();
        assert_eq!(code.as_str().len(), VERIFICATION_CODE_LEN);
        assert!(code.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_ne!(code, VerificationCode::generate());
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        assert!(VerificationCode::parse("short").is_err());
        assert!(VerificationCode::parse(&"a".repeat(31)).is_err());
        assert!(VerificationCode::parse(&format!("{}-", "a".repeat(31))).is_err());
        let ok = "Ab3".repeat(10) + "xy";
        assert_eq!(VerificationCode::parse(&ok).unwrap().as_str(), ok);
    }

    #[test]
    fn deserialization_validates() {
        let bad: Result<VerificationCode, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
