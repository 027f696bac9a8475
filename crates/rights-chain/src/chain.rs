//! # Authorization Chains
//!
//! An [`AuthorizationChain`] links a product to the license and asset it
//! was made under. The stored record only says the link was issued; whether
//! it still authorizes anything is decided at read time by [`evaluate`]
//! against the current license and asset rows. Revoking a license or
//! rejecting an asset therefore invalidates its chains without touching
//! them.

use chrono::{DateTime, Utc};
use rights_core::{ApplicationId, AssetId, ChainId, ProductId};
use rights_state::{
    ApplicationStatus, IpAsset, LicenseApplication, Product, VerificationStatus,
};
use serde::{Deserialize, Serialize};

use crate::code::VerificationCode;
use crate::ChainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationChain {
    pub id: ChainId,
    pub product_id: ProductId,
    pub asset_id: AssetId,
    pub license_id: ApplicationId,
    /// Set when this chain derives from an earlier one (re-licensing).
    pub parent_chain_id: Option<ChainId>,
    pub verification_code: VerificationCode,
    pub ledger_hash: String,
    pub is_active: bool,
    pub revocation_reason: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationChain {
    /// `id` is chosen before the ledger call so the ledger entry can name
    /// the chain it backs.
    pub fn issue(
        id: ChainId,
        product: &Product,
        verification_code: VerificationCode,
        ledger_hash: String,
        parent_chain_id: Option<ChainId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id: product.id,
            asset_id: product.asset_id,
            license_id: product.license_id,
            parent_chain_id,
            verification_code,
            ledger_hash,
            is_active: true,
            revocation_reason: None,
            revoked_at: None,
            created_at: now,
        }
    }

    pub fn revoke(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), ChainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ChainError::MissingReason);
        }
        if !self.is_active {
            return Err(ChainError::AlreadyRevoked(self.id));
        }
        self.is_active = false;
        self.revocation_reason = Some(reason.to_string());
        self.revoked_at = Some(now);
        Ok(())
    }
}

// ─── Live validity ───────────────────────────────────────────────────

/// Why a chain does not currently authorize its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    ChainRevoked,
    LicenseNotApproved { status: ApplicationStatus },
    LicenseInactive,
    LicenseExpired { expired_at: DateTime<Utc> },
    AssetNotApproved { status: VerificationStatus },
    LedgerEntryMissing,
    LedgerUnavailable,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChainRevoked => f.write_str("chain has been revoked"),
            Self::LicenseNotApproved { status } => write!(f, "license is {status}"),
            Self::LicenseInactive => f.write_str("license is inactive"),
            Self::LicenseExpired { expired_at } => write!(f, "license expired at {expired_at}"),
            Self::AssetNotApproved { status } => write!(f, "asset verification is {status}"),
            Self::LedgerEntryMissing => f.write_str("ledger has no entry for this chain"),
            Self::LedgerUnavailable => f.write_str("ledger could not be reached"),
        }
    }
}

/// The rows a chain is evaluated against, read at verification time.
#[derive(Debug, Clone, Copy)]
pub struct ChainContext<'a> {
    pub chain: &'a AuthorizationChain,
    pub license: &'a LicenseApplication,
    pub asset: &'a IpAsset,
    pub now: DateTime<Utc>,
}

/// Check everything that can be decided from local rows. The ledger check
/// is asynchronous and done by the caller.
pub fn evaluate(ctx: &ChainContext<'_>) -> Result<(), InvalidReason> {
    if !ctx.chain.is_active {
        return Err(InvalidReason::ChainRevoked);
    }
    if ctx.license.status != ApplicationStatus::Approved {
        return Err(InvalidReason::LicenseNotApproved {
            status: ctx.license.status,
        });
    }
    if !ctx.license.is_active {
        return Err(InvalidReason::LicenseInactive);
    }
    if let Some(at) = ctx.license.expires_at {
        if at <= ctx.now {
            return Err(InvalidReason::LicenseExpired { expired_at: at });
        }
    }
    if ctx.asset.verification_status != VerificationStatus::Approved {
        return Err(InvalidReason::AssetNotApproved {
            status: ctx.asset.verification_status,
        });
    }
    Ok(())
}

/// Result of verifying a chain by its public code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainVerdict {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    pub chain: AuthorizationChain,
    pub product: Product,
    pub asset: IpAsset,
    pub license: LicenseApplication,
}

impl ChainVerdict {
    pub fn new(
        outcome: Result<(), InvalidReason>,
        chain: AuthorizationChain,
        product: Product,
        asset: IpAsset,
        license: LicenseApplication,
    ) -> Self {
        let reason = outcome.err();
        Self {
            valid: reason.is_none(),
            reason,
            chain,
            product,
            asset,
            license,
        }
    }
}
