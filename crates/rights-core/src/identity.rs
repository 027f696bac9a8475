//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier in the licensing stack. Each wraps
//! a v4 UUID and serializes transparently, so the wire format is a bare UUID
//! string while the type system keeps namespaces apart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

typed_id!(
    /// A platform account: creator, secondary creator, buyer or admin.
    UserId,
    "user"
);

typed_id!(
    /// A registered creative work.
    AssetId,
    "asset"
);

typed_id!(
    /// Published license terms for an asset.
    TermsId,
    "terms"
);

typed_id!(
    /// A license application. Once approved, the same id names the license.
    ApplicationId,
    "license"
);

typed_id!(
    /// A sellable product created under a license.
    ProductId,
    "product"
);

typed_id!(
    /// A sale, fee or revenue-share transaction.
    TransactionId,
    "txn"
);

typed_id!(
    /// An authorization chain record.
    ChainId,
    "chain"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_namespace_prefix() {
        let id = Uuid::nil();
        assert_eq!(
            ProductId::from(id).to_string(),
            "product:00000000-0000-0000-0000-000000000000"
        );
        assert!(ApplicationId::new().to_string().starts_with("license:"));
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = AssetId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let back: AssetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(UserId::new(), UserId::new());
    }
}
