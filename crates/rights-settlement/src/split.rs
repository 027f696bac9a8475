//! # Revenue Split
//!
//! ```text
//! amount        = round(price × quantity)
//! platform_fee  = round(amount × fee% / 100)
//! net           = amount − platform_fee
//! ip_share      = round(net × share% / 100)
//! licensee      = net − ip_share
//! ```
//!
//! Rounding is to the currency minor unit, midpoint to even. The licensee
//! share is the remainder, so `ip_share + licensee == net` and
//! `platform_fee + net == amount` hold exactly for every input.

use rights_core::{Money, MoneyError, Percent, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("settlement arithmetic failed: {0}")]
    Arithmetic(#[from] MoneyError),
}

pub const DEFAULT_PLATFORM_FEE_PERCENT: u32 = 5;

/// Platform fee configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub platform_fee_percent: Percent,
}

impl FeeSchedule {
    pub fn new(platform_fee_percent: Percent) -> Self {
        Self {
            platform_fee_percent,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_percent: Percent::saturating_whole(DEFAULT_PLATFORM_FEE_PERCENT),
        }
    }
}

/// How a sale's net proceeds divide between rights-holder and licensee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueShares {
    pub net_amount: Money,
    pub ip_creator_share: Money,
    pub secondary_creator_share: Money,
    pub ip_creator_id: UserId,
    pub secondary_creator_id: UserId,
    pub revenue_share_percent: Percent,
}

/// Full breakdown of one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSplit {
    pub amount: Money,
    pub platform_fee: Money,
    pub shares: RevenueShares,
}

impl SaleSplit {
    /// Both reconciliation identities hold.
    pub fn reconciles(&self) -> bool {
        let parts = self
            .shares
            .ip_creator_share
            .checked_add(self.shares.secondary_creator_share);
        let whole = self.platform_fee.checked_add(self.shares.net_amount);
        parts == Ok(self.shares.net_amount) && whole == Ok(self.amount)
    }
}

/// Split a sale of `quantity` units at `unit_price`.
pub fn compute_split(
    unit_price: Money,
    quantity: u32,
    schedule: &FeeSchedule,
    revenue_share: Percent,
    ip_creator_id: UserId,
    secondary_creator_id: UserId,
) -> Result<SaleSplit, SettlementError> {
    if quantity == 0 {
        return Err(SettlementError::InvalidQuantity);
    }
    let amount = unit_price.times(quantity)?.round_minor();
    let platform_fee = amount.percent(schedule.platform_fee_percent)?;
    let net_amount = amount.checked_sub(platform_fee)?;
    let ip_creator_share = net_amount.percent(revenue_share)?;
    let secondary_creator_share = net_amount.checked_sub(ip_creator_share)?;

    Ok(SaleSplit {
        amount,
        platform_fee,
        shares: RevenueShares {
            net_amount,
            ip_creator_share,
            secondary_creator_share,
            ip_creator_id,
            secondary_creator_id,
            revenue_share_percent: revenue_share,
        },
    })
}
