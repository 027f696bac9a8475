//! # rights-state — Entities and Lifecycle State Machines
//!
//! The records the licensing engine operates on, each owning the rules for
//! its own transitions:
//!
//! - [`asset`]: IP assets, moderation and listing status.
//! - [`terms`]: license terms with the per-terms capacity counter.
//! - [`application`]: the license application state machine.
//! - [`product`]: products and their inventory.
//! - [`account`]: the role/standing view of a platform account.
//!
//! Rules that span entities (an application needs an approved asset, a
//! revoke needs no live products) live in the engine, which holds the
//! rows involved. Nothing here performs I/O or reads the clock; callers
//! pass `now`.
//!
//! Every transition method either succeeds or leaves `self` untouched.

pub mod account;
pub mod application;
pub mod asset;
pub mod product;
pub mod terms;

pub use account::{Account, AccountStatus, Role};
pub use application::{
    ApplicationData, ApplicationError, ApplicationStatus, ApplicationTransition,
    LicenseApplication,
};
pub use asset::{
    AssetEdit, AssetError, AssetMetadata, AssetStatus, IpAsset, NewAsset, VerificationStatus,
};
pub use product::{
    Product, ProductDraft, ProductEdit, ProductError, ProductSpecifications, ProductStatus,
};
pub use terms::{LicenseDuration, LicenseTerms, LicenseType, TermsDraft, TermsError};

use rights_core::RightsError;

// ─── Error conversions ───────────────────────────────────────────────

impl From<AssetError> for RightsError {
    fn from(err: AssetError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<TermsError> for RightsError {
    fn from(err: TermsError) -> Self {
        match err {
            TermsError::ShareOutOfRange(_)
            | TermsError::NegativeFee(_)
            | TermsError::InvalidDuration(_) => Self::InvalidInput(err.to_string()),
            TermsError::CapacityBelowApproved { .. }
            | TermsError::CapacityExhausted { .. }
            | TermsError::Inactive => Self::Conflict(err.to_string()),
        }
    }
}

impl From<ApplicationError> for RightsError {
    fn from(err: ApplicationError) -> Self {
        match err {
            ApplicationError::MissingReason(_) => Self::InvalidInput(err.to_string()),
            ApplicationError::Expired(_) => Self::Expired(err.to_string()),
            ApplicationError::InvalidTransition { .. }
            | ApplicationError::TerminalState(_)
            | ApplicationError::NotApproved(_)
            | ApplicationError::Inactive => Self::Conflict(err.to_string()),
        }
    }
}

impl From<ProductError> for RightsError {
    fn from(err: ProductError) -> Self {
        match err {
            ProductError::InsufficientInventory {
                requested,
                available,
            } => Self::InsufficientInventory {
                requested,
                available,
            },
            ProductError::InvalidQuantity
            | ProductError::InvalidPrice(_)
            | ProductError::EmptyField(_) => Self::InvalidInput(err.to_string()),
            ProductError::InvalidTransition { .. }
            | ProductError::NotPurchasable(_)
            | ProductError::NoInventory => Self::Conflict(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_license_maps_to_expired() {
        let err: RightsError = ApplicationError::Expired(chrono::Utc::now()).into();
        assert!(matches!(err, RightsError::Expired(_)));
    }

    #[test]
    fn capacity_exhaustion_is_a_conflict() {
        let err: RightsError = TermsError::CapacityExhausted { max: 1 }.into();
        assert!(matches!(err, RightsError::Conflict(_)));
    }

    #[test]
    fn inventory_shortfall_keeps_its_numbers() {
        let err: RightsError = ProductError::InsufficientInventory {
            requested: 2,
            available: 0,
        }
        .into();
        assert_eq!(
            err,
            RightsError::InsufficientInventory {
                requested: 2,
                available: 0
            }
        );
    }
}
