//! # rights-settlement — Purchase Settlement
//!
//! - [`split`]: how a sale amount divides into platform fee, rights-holder
//!   share and licensee share. Pure, exact, reconciles to the cent.
//! - [`transaction`]: the transaction record and its
//!   `pending → completed | failed`, `completed → refunded` lifecycle.
//! - [`gateway`]: the payment-gateway contract, a bounded retry/timeout
//!   policy around `confirm`, and an in-process simulated gateway.
//!
//! Inventory and row locking are the engine's business; this crate never
//! sees a product row.

pub mod gateway;
pub mod split;
pub mod transaction;

pub use gateway::{
    confirm_with_retry, GatewayError, PaymentGateway, PaymentIntent, PaymentIntentRequest,
    PaymentOutcome, RefundReceipt, RetryPolicy, SimulatedGateway, SimulatedMode,
};
pub use split::{compute_split, FeeSchedule, DEFAULT_PLATFORM_FEE_PERCENT, RevenueShares, SaleSplit, SettlementError};
pub use transaction::{
    PurchaseMetadata, ShippingInfo, Transaction, TransactionError, TransactionStatus,
    TransactionType,
};

use rights_core::RightsError;

impl From<SettlementError> for RightsError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InvalidQuantity => Self::InvalidInput(err.to_string()),
            SettlementError::Arithmetic(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<TransactionError> for RightsError {
    fn from(err: TransactionError) -> Self {
        Self::Conflict(err.to_string())
    }
}

impl From<GatewayError> for RightsError {
    fn from(err: GatewayError) -> Self {
        Self::Internal(format!("payment gateway: {err}"))
    }
}
