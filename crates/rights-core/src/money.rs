//! # Money and Percentages
//!
//! Exact decimal arithmetic for prices, fees and revenue shares.
//!
//! All amounts are [`rust_decimal::Decimal`] and serialize as strings
//! (`"28.50"`). Rounding to the currency minor unit uses banker's rounding
//! (midpoint to even) at [`MINOR_UNIT_SCALE`] places. Callers that split an
//! amount compute the last part by subtraction so the parts always sum to
//! the whole.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decimal places of the settlement currency's minor unit (cents).
pub const MINOR_UNIT_SCALE: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),

    #[error("percentage must be between 0 and 100: {0}")]
    PercentOutOfRange(Decimal),

    #[error("arithmetic overflow")]
    Overflow,
}

/// A non-negative monetary amount in the settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Wrap an amount, rejecting negatives.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        Ok(Self(amount))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Round to the currency minor unit, midpoint to even.
    pub fn round_minor(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointNearestEven),
        )
    }

    /// `self × quantity`, unrounded.
    pub fn times(self, quantity: u32) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// `self × pct / 100`, rounded to the minor unit.
    pub fn percent(self, pct: Percent) -> Result<Self, MoneyError> {
        let product = self.0.checked_mul(pct.0).ok_or(MoneyError::Overflow)?;
        let share = product
            .checked_div(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self(share).round_minor())
    }

    pub fn checked_add(self, other: Money) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Subtract, rejecting a negative result.
    pub fn checked_sub(self, other: Money) -> Result<Self, MoneyError> {
        let diff = self.0.checked_sub(other.0).ok_or(MoneyError::Overflow)?;
        Self::new(diff)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(MoneyError::PercentOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// A whole-number percentage. Values above 100 are rejected.
    pub fn whole(value: u32) -> Result<Self, MoneyError> {
        Self::new(Decimal::from(value))
    }

    /// A whole-number percentage, capped at 100.
    pub fn saturating_whole(value: u32) -> Self {
        Self(Decimal::from(value.min(100)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Percent {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for Decimal {
    fn from(value: Percent) -> Self {
        value.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
