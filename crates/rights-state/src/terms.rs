//! # License Terms
//!
//! The conditions an asset owner publishes for licensing a work: share of
//! net proceeds, flat fee, territory, duration and an optional cap on the
//! number of concurrently approved licenses.
//!
//! ## Capacity
//!
//! `approved_count` is the per-terms capacity counter. It is only changed
//! through [`LicenseTerms::claim_slot`] and [`LicenseTerms::release_slot`],
//! and callers hold the terms row while doing so, which makes check-and-
//! increment a single atomic step.

use chrono::{DateTime, Duration, Utc};
use rights_core::{AssetId, Money, Percent, TermsId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest revenue share an owner may ask for, in percent.
pub const MIN_REVENUE_SHARE_PERCENT: u32 = 5;
/// Highest revenue share an owner may ask for, in percent.
pub const MAX_REVENUE_SHARE_PERCENT: u32 = 50;

pub const DEFAULT_TERRITORY: &str = "global";
pub const DEFAULT_DURATION: &str = "perpetual";

// ─── License Type ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    Standard,
    Premium,
    Exclusive,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Exclusive => "exclusive",
        }
    }
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Duration ────────────────────────────────────────────────────────

/// Validity window granted to a license approved under these terms.
///
/// Written as `"perpetual"` or `"<n> day(s)|month(s)|year(s)"`. Months count
/// as 30 days and years as 365.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseDuration {
    Perpetual,
    Days(u32),
}

impl LicenseDuration {
    pub fn parse(raw: &str) -> Result<Self, TermsError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized == DEFAULT_DURATION {
            return Ok(Self::Perpetual);
        }
        let invalid = || TermsError::InvalidDuration(raw.to_string());
        let mut parts = normalized.split_whitespace();
        let count: u32 = parts
            .next()
            .and_then(|n| n.parse().ok())
            .filter(|n| *n > 0)
            .ok_or_else(invalid)?;
        let unit = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        let per_unit = match unit.trim_end_matches('s') {
            "day" => 1,
            "month" => 30,
            "year" => 365,
            _ => return Err(invalid()),
        };
        count.checked_mul(per_unit).map(Self::Days).ok_or_else(invalid)
    }

    /// Expiry instant for a license approved at `from`.
    pub fn expiry_from(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Perpetual => None,
            Self::Days(days) => Some(from + Duration::days(i64::from(*days))),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TermsError {
    #[error("revenue share must be between 5 and 50 percent, got {0}")]
    ShareOutOfRange(Decimal),

    #[error("base fee must not be negative, got {0}")]
    NegativeFee(Decimal),

    #[error("unrecognized license duration {0:?}")]
    InvalidDuration(String),

    #[error("max_licenses {max} is below the {approved} licenses already approved")]
    CapacityBelowApproved { max: u32, approved: u32 },

    #[error("license capacity reached: {max} of {max} approved")]
    CapacityExhausted { max: u32 },

    #[error("license terms are inactive")]
    Inactive,
}

// ─── Terms ───────────────────────────────────────────────────────────

/// Caller-supplied terms, validated by [`LicenseTerms::publish`] and
/// [`LicenseTerms::revise`].
#[derive(Debug, Clone, Deserialize)]
pub struct TermsDraft {
    pub license_type: LicenseType,
    pub revenue_share_percent: Decimal,
    #[serde(default)]
    pub base_fee: Decimal,
    #[serde(default)]
    pub territory: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub restrictions: Option<String>,
    #[serde(default)]
    pub auto_approve: bool,
    /// `0` means unlimited.
    #[serde(default)]
    pub max_licenses: u32,
}

struct ValidatedDraft {
    share: Percent,
    fee: Money,
    territory: String,
    duration: String,
}

impl TermsDraft {
    fn validate(&self) -> Result<ValidatedDraft, TermsError> {
        let min = Decimal::from(MIN_REVENUE_SHARE_PERCENT);
        let max = Decimal::from(MAX_REVENUE_SHARE_PERCENT);
        if self.revenue_share_percent < min || self.revenue_share_percent > max {
            return Err(TermsError::ShareOutOfRange(self.revenue_share_percent));
        }
        let share = Percent::new(self.revenue_share_percent)
            .map_err(|_| TermsError::ShareOutOfRange(self.revenue_share_percent))?;
        let fee = Money::new(self.base_fee).map_err(|_| TermsError::NegativeFee(self.base_fee))?;

        let territory = non_blank(self.territory.as_deref()).unwrap_or(DEFAULT_TERRITORY);
        let duration = non_blank(self.duration.as_deref()).unwrap_or(DEFAULT_DURATION);
        LicenseDuration::parse(duration)?;

        Ok(ValidatedDraft {
            share,
            fee,
            territory: territory.to_string(),
            duration: duration.to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseTerms {
    pub id: TermsId,
    pub asset_id: AssetId,
    pub license_type: LicenseType,
    pub revenue_share_percent: Percent,
    pub base_fee: Money,
    pub territory: String,
    pub duration: String,
    pub requirements: Option<String>,
    pub restrictions: Option<String>,
    pub auto_approve: bool,
    pub max_licenses: u32,
    pub is_active: bool,
    /// Number of currently approved licenses under these terms.
    pub approved_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LicenseTerms {
    pub fn publish(
        asset_id: AssetId,
        draft: TermsDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, TermsError> {
        let v = draft.validate()?;
        Ok(Self {
            id: TermsId::new(),
            asset_id,
            license_type: draft.license_type,
            revenue_share_percent: v.share,
            base_fee: v.fee,
            territory: v.territory,
            duration: v.duration,
            requirements: draft.requirements,
            restrictions: draft.restrictions,
            auto_approve: draft.auto_approve,
            max_licenses: draft.max_licenses,
            is_active: true,
            approved_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the editable fields. A cap below the current approved count
    /// is refused rather than leaving the counter over its limit.
    pub fn revise(&mut self, draft: TermsDraft, now: DateTime<Utc>) -> Result<(), TermsError> {
        let v = draft.validate()?;
        if draft.max_licenses != 0 && draft.max_licenses < self.approved_count {
            return Err(TermsError::CapacityBelowApproved {
                max: draft.max_licenses,
                approved: self.approved_count,
            });
        }
        self.license_type = draft.license_type;
        self.revenue_share_percent = v.share;
        self.base_fee = v.fee;
        self.territory = v.territory;
        self.duration = v.duration;
        self.requirements = draft.requirements;
        self.restrictions = draft.restrictions;
        self.auto_approve = draft.auto_approve;
        self.max_licenses = draft.max_licenses;
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn is_capped(&self) -> bool {
        self.max_licenses > 0
    }

    pub fn has_capacity(&self) -> bool {
        !self.is_capped() || self.approved_count < self.max_licenses
    }

    /// Take one approval slot, or fail if the cap is reached.
    pub fn claim_slot(&mut self) -> Result<(), TermsError> {
        if !self.has_capacity() {
            return Err(TermsError::CapacityExhausted {
                max: self.max_licenses,
            });
        }
        self.approved_count += 1;
        Ok(())
    }

    /// Give back a slot when an approved license is revoked.
    pub fn release_slot(&mut self) {
        self.approved_count = self.approved_count.saturating_sub(1);
    }

    /// Expiry for a license approved under these terms at `approved_at`.
    pub fn license_expiry(&self, approved_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        LicenseDuration::parse(&self.duration)
            .ok()
            .and_then(|d| d.expiry_from(approved_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(share: Decimal, max: u32) -> TermsDraft {
        TermsDraft {
            license_type: LicenseType::Standard,
            revenue_share_percent: share,
            base_fee: dec!(0),
            territory: None,
            duration: None,
            requirements: None,
            restrictions: None,
            auto_approve: false,
            max_licenses: max,
        }
    }

    #[test]
    fn publish_applies_defaults() {
        let terms = LicenseTerms::publish(AssetId::new(), draft(dec!(20), 0), Utc::now()).unwrap();
        assert_eq!(terms.territory, "global");
        assert_eq!(terms.duration, "perpetual");
        assert!(terms.is_active);
        assert_eq!(terms.approved_count, 0);
        assert!(!terms.is_capped());
    }

    #[test]
    fn share_bounds_are_inclusive() {
        for ok in [dec!(5), dec!(12.5), dec!(50)] {
            assert!(LicenseTerms::publish(AssetId::new(), draft(ok, 0), Utc::now()).is_ok());
        }
        for bad in [dec!(4.99), dec!(50.01), dec!(0)] {
            assert_eq!(
                LicenseTerms::publish(AssetId::new(), draft(bad, 0), Utc::now()).unwrap_err(),
                TermsError::ShareOutOfRange(bad)
            );
        }
    }

    #[test]
    fn negative_fee_is_rejected() {
        let mut d = draft(dec!(10), 0);
        d.base_fee = dec!(-1);
        assert_eq!(
            LicenseTerms::publish(AssetId::new(), d, Utc::now()).unwrap_err(),
            TermsError::NegativeFee(dec!(-1))
        );
    }

    #[test]
    fn capacity_counter_stops_at_cap() {
        let mut terms = LicenseTerms::publish(AssetId::new(), draft(dec!(10), 2), Utc::now()).unwrap();
        terms.claim_slot().unwrap();
        terms.claim_slot().unwrap();
        assert_eq!(
            terms.claim_slot().unwrap_err(),
            TermsError::CapacityExhausted { max: 2 }
        );
        assert_eq!(terms.approved_count, 2);
        terms.release_slot();
        assert!(terms.has_capacity());
    }

    #[test]
    fn revise_refuses_cap_below_approved() {
        let mut terms = LicenseTerms::publish(AssetId::new(), draft(dec!(10), 3), Utc::now()).unwrap();
        terms.claim_slot().unwrap();
        terms.claim_slot().unwrap();
        let err = terms.revise(draft(dec!(10), 1), Utc::now()).unwrap_err();
        assert_eq!(err, TermsError::CapacityBelowApproved { max: 1, approved: 2 });
        assert_eq!(terms.max_licenses, 3);
    }

    #[test]
    fn durations_parse() {
        assert_eq!(LicenseDuration::parse("perpetual").unwrap(), LicenseDuration::Perpetual);
        assert_eq!(LicenseDuration::parse("30 days").unwrap(), LicenseDuration::Days(30));
        assert_eq!(LicenseDuration::parse("1 year").unwrap(), LicenseDuration::Days(365));
        assert_eq!(LicenseDuration::parse("6 Months").unwrap(), LicenseDuration::Days(180));
        assert!(LicenseDuration::parse("forever").is_err());
        assert!(LicenseDuration::parse("0 days").is_err());
        assert!(LicenseDuration::parse("3 fortnights").is_err());
    }

    #[test]
    fn expiry_follows_duration() {
        let mut d = draft(dec!(10), 0);
        d.duration = Some("10 days".to_string());
        let terms = LicenseTerms::publish(AssetId::new(), d, Utc::now()).unwrap();
        let approved_at = Utc::now();
        assert_eq!(
            terms.license_expiry(approved_at),
            Some(approved_at + Duration::days(10))
        );
    }
}
