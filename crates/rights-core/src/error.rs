//! # Error Taxonomy
//!
//! Every engine operation returns [`RightsError`]. Crate-local errors
//! (`ApplicationError`, `ProductError`, `SettlementError`, ...) convert into
//! it so callers only ever match one enum.
//!
//! A rejected operation leaves every entity it touched in its pre-call
//! state; the variant says why it was rejected.

use thiserror::Error;

/// Top-level error type for the rights licensing stack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RightsError {
    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("asset", "license", "product", ...).
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not allowed to perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The operation conflicts with current entity state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough stock to satisfy a purchase. A specific kind of conflict.
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        requested: u32,
        available: u32,
    },

    /// The license exists and was approved, but its validity window has passed.
    #[error("expired: {0}")]
    Expired(String),

    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator or persistence failure surfaced synchronously.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RightsError {
    /// Shorthand for [`RightsError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the error is a state conflict (including inventory shortfall).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::InsufficientInventory { .. })
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

impl From<CanonicalizationError> for RightsError {
    fn from(err: CanonicalizationError) -> Self {
        Self::Internal(err.to_string())
    }
}
