//! # Transactions
//!
//! ## States
//!
//! ```text
//! Pending ──▶ Completed ──▶ Refunded (terminal)
//!    │
//!    └──▶ Failed (terminal)
//! ```
//!
//! A transaction is created `pending` in the same atomic unit that
//! reserves inventory. Payment reconciliation moves it to `completed` or
//! `failed` after commit.

use chrono::{DateTime, Utc};
use rights_core::{ApplicationId, Money, ProductId, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::split::{RevenueShares, SaleSplit};

// ─── Enums ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    ProductSale,
    LicenseFee,
    RevenueShare,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductSale => "product_sale",
            Self::LicenseFee => "license_fee",
            Self::RevenueShare => "revenue_share",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid transaction transition: {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

// ─── Payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub recipient: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// What the buyer asked for, kept with the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseMetadata {
    pub quantity: u32,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ─── Transaction ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub transaction_type: TransactionType,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub product_id: Option<ProductId>,
    pub license_id: Option<ApplicationId>,
    pub amount: Money,
    pub platform_fee: Money,
    pub revenue_shares: RevenueShares,
    pub metadata: PurchaseMetadata,
    pub currency: String,
    /// Gateway payment intent id, once one exists.
    pub payment_reference: Option<String>,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub refund_amount: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A pending product sale built from a computed split.
    pub fn product_sale(
        product_id: ProductId,
        license_id: ApplicationId,
        buyer_id: UserId,
        split: SaleSplit,
        metadata: PurchaseMetadata,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            transaction_type: TransactionType::ProductSale,
            buyer_id,
            seller_id: split.shares.secondary_creator_id,
            product_id: Some(product_id),
            license_id: Some(license_id),
            amount: split.amount,
            platform_fee: split.platform_fee,
            revenue_shares: split.shares,
            metadata,
            currency: currency.to_string(),
            payment_reference: None,
            status: TransactionStatus::Pending,
            failure_reason: None,
            processed_at: None,
            refunded_at: None,
            refund_reason: None,
            refund_amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }

    pub fn attach_intent(&mut self, intent_id: String, now: DateTime<Utc>) {
        self.payment_reference = Some(intent_id);
        self.updated_at = now;
    }

    /// PENDING → COMPLETED.
    pub fn complete(&mut self, reference: String, now: DateTime<Utc>) -> Result<(), TransactionError> {
        self.require(TransactionStatus::Pending, TransactionStatus::Completed)?;
        self.status = TransactionStatus::Completed;
        self.payment_reference = Some(reference);
        self.processed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// PENDING → FAILED.
    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), TransactionError> {
        self.require(TransactionStatus::Pending, TransactionStatus::Failed)?;
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// COMPLETED → REFUNDED. `amount` is clamped to the sale amount.
    pub fn refund(
        &mut self,
        amount: Money,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Money, TransactionError> {
        self.require(TransactionStatus::Completed, TransactionStatus::Refunded)?;
        let refunded = amount.min(self.amount);
        self.status = TransactionStatus::Refunded;
        self.refunded_at = Some(now);
        self.refund_reason = Some(reason);
        self.refund_amount = Some(refunded);
        self.updated_at = now;
        Ok(refunded)
    }

    /// Undo [`Transaction::refund`] after the gateway refused it.
    pub fn revert_refund(&mut self, now: DateTime<Utc>) -> Result<(), TransactionError> {
        self.require(TransactionStatus::Refunded, TransactionStatus::Completed)?;
        self.status = TransactionStatus::Completed;
        self.refunded_at = None;
        self.refund_reason = None;
        self.refund_amount = None;
        self.updated_at = now;
        Ok(())
    }

    fn require(
        &self,
        expected: TransactionStatus,
        target: TransactionStatus,
    ) -> Result<(), TransactionError> {
        if self.status != expected {
            return Err(TransactionError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{compute_split, FeeSchedule};
    use rights_core::Percent;
    use rust_decimal_macros::dec;

    fn pending() -> Transaction {
        let split = compute_split(
            Money::new(dec!(10.00)).unwrap(),
            3,
            &FeeSchedule::default(),
            Percent::whole(20).unwrap(),
            UserId::new(),
            UserId::new(),
        )
        .unwrap();
        Transaction::product_sale(
            ProductId::new(),
            ApplicationId::new(),
            UserId::new(),
            split,
            PurchaseMetadata {
                quantity: 3,
                payment_method: "card".to_string(),
                shipping: None,
                notes: None,
            },
            "usd",
            Utc::now(),
        )
    }

    #[test]
    fn sale_is_pending_and_seller_is_licensee() {
        let txn = pending();
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.seller_id, txn.revenue_shares.secondary_creator_id);
        assert!(txn.involves(txn.buyer_id));
        assert!(!txn.involves(UserId::new()));
    }

    #[test]
    fn complete_then_refund() {
        let mut txn = pending();
        txn.complete("pi_1".into(), Utc::now()).unwrap();
        assert!(txn.processed_at.is_some());
        let refunded = txn
            .refund(Money::new(dec!(100)).unwrap(), "damaged".into(), Utc::now())
            .unwrap();
        assert_eq!(refunded, Money::new(dec!(30.00)).unwrap());
        assert_eq!(txn.status, TransactionStatus::Refunded);
        assert_eq!(txn.refund_reason.as_deref(), Some("damaged"));
    }

    #[test]
    fn pending_cannot_be_refunded() {
        let mut txn = pending();
        let before = txn.clone();
        assert_eq!(
            txn.refund(Money::zero(), "x".into(), Utc::now()).unwrap_err(),
            TransactionError::InvalidTransition {
                from: TransactionStatus::Pending,
                to: TransactionStatus::Refunded
            }
        );
        assert_eq!(txn, before);
    }

    #[test]
    fn failed_is_terminal() {
        let mut txn = pending();
        txn.fail("card declined".into(), Utc::now()).unwrap();
        assert!(txn.complete("pi".into(), Utc::now()).is_err());
        assert_eq!(txn.failure_reason.as_deref(), Some("card declined"));
    }

    #[test]
    fn revert_refund_restores_completed() {
        let mut txn = pending();
        txn.complete("pi_1".into(), Utc::now()).unwrap();
        txn.refund(Money::new(dec!(5)).unwrap(), "r".into(), Utc::now())
            .unwrap();
        txn.revert_refund(Utc::now()).unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert!(txn.refunded_at.is_none());
        assert!(txn.refund_amount.is_none());
    }
}
