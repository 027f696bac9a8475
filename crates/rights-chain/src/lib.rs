//! # rights-chain — Authorization Chains
//!
//! Provenance records for products sold under a license:
//!
//! - **Code** (`code.rs`): the 32-character public verification code.
//! - **Ledger** (`ledger.rs`): the external integrity-ledger contract and
//!   the in-process [`DigestLedger`].
//! - **Chain** (`chain.rs`): the chain record and [`evaluate`], the live
//!   validity check run on every verification.
//!
//! ## Liveness
//!
//! A chain is valid only while its license is approved, active and
//! unexpired and its asset is approved. Those facts are read from the
//! current rows at verification time, never cached on the chain.

pub mod chain;
pub mod code;
pub mod ledger;

pub use chain::{evaluate, AuthorizationChain, ChainContext, ChainVerdict, InvalidReason};
pub use code::{VerificationCode, VERIFICATION_CODE_LEN};
pub use ledger::{
    AssetRegistration, DigestLedger, Ledger, LedgerError, LedgerReceipt, ProductIssuance,
};

use rights_core::{ChainId, RightsError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("malformed verification code: {0:?}")]
    InvalidCode(String),

    #[error("chain {0} is already revoked")]
    AlreadyRevoked(ChainId),

    #[error("a reason is required to revoke a chain")]
    MissingReason,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ChainError> for RightsError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidCode(_) | ChainError::MissingReason => {
                Self::InvalidInput(err.to_string())
            }
            ChainError::AlreadyRevoked(_) => Self::Conflict(err.to_string()),
            ChainError::Ledger(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<LedgerError> for RightsError {
    fn from(err: LedgerError) -> Self {
        Self::Internal(err.to_string())
    }
}
