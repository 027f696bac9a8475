//! # Products
//!
//! A sellable item a licensee creates under an approved license.
//!
//! ## States
//!
//! ```text
//! Draft ──▶ Active ◀──▶ Suspended
//!   ▲         │  ▲          ▲
//!   └─────────┘  │          │
//!            reserve→0   restock
//!                ▼          │
//!             SoldOut ──────┘
//! ```
//!
//! Inventory moves only through [`Product::reserve`] (a sale),
//! [`Product::release`] (a failed payment handing stock back) and
//! [`Product::restock`]. `reserve` refuses to go below zero, and reaching
//! zero flips the product to `sold_out` in the same step.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rights_core::{ApplicationId, AssetId, Money, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Active,
    SoldOut,
    Suspended,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::SoldOut => "sold_out",
            Self::Suspended => "suspended",
        }
    }

    /// Draft and active products keep their license from being revoked.
    pub fn holds_license(&self) -> bool {
        matches!(self, Self::Draft | Self::Active)
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    #[error("invalid product transition: {from} -> {to}")]
    InvalidTransition {
        from: ProductStatus,
        to: ProductStatus,
    },

    #[error("product is not available for purchase (status {0})")]
    NotPurchasable(ProductStatus),

    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("price must be greater than zero, got {0}")]
    InvalidPrice(Decimal),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("cannot activate a product with no inventory")]
    NoInventory,
}

// ─── Product ─────────────────────────────────────────────────────────

/// Physical or technical details of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSpecifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Caller-supplied fields for a new product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub inventory_count: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub specifications: ProductSpecifications,
}

/// Partial edit of a product's descriptive fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub specifications: Option<ProductSpecifications>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub creator_id: UserId,
    pub license_id: ApplicationId,
    pub asset_id: AssetId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: Money,
    pub inventory_count: u32,
    pub sales_count: u32,
    pub view_count: u64,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub specifications: ProductSpecifications,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn positive_price(price: Decimal) -> Result<Money, ProductError> {
    if price <= Decimal::ZERO {
        return Err(ProductError::InvalidPrice(price));
    }
    Money::new(price).map_err(|_| ProductError::InvalidPrice(price))
}

impl Product {
    /// Create a product in `draft`.
    pub fn create(
        creator_id: UserId,
        license_id: ApplicationId,
        asset_id: AssetId,
        draft: ProductDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, ProductError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(ProductError::EmptyField("title"));
        }
        let price = positive_price(draft.price)?;
        Ok(Self {
            id: ProductId::new(),
            creator_id,
            license_id,
            asset_id,
            title,
            description: draft.description,
            category: draft.category,
            price,
            inventory_count: draft.inventory_count,
            sales_count: 0,
            view_count: 0,
            images: draft.images,
            tags: draft.tags,
            specifications: draft.specifications,
            status: ProductStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.creator_id == user
    }

    /// Apply a partial edit. Nothing changes if any field is invalid.
    pub fn edit(&mut self, edit: ProductEdit, now: DateTime<Utc>) -> Result<(), ProductError> {
        let title = match edit.title {
            Some(t) if t.trim().is_empty() => return Err(ProductError::EmptyField("title")),
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        let price = edit.price.map(positive_price).transpose()?;

        if let Some(t) = title {
            self.title = t;
        }
        if let Some(p) = price {
            self.price = p;
        }
        if let Some(d) = edit.description {
            self.description = d;
        }
        if let Some(c) = edit.category {
            self.category = c;
        }
        if let Some(i) = edit.images {
            self.images = i;
        }
        if let Some(t) = edit.tags {
            self.tags = t;
        }
        if let Some(s) = edit.specifications {
            self.specifications = s;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Owner-driven status change.
    ///
    /// `sold_out` is never a target: it is entered by selling the last unit
    /// and left by restocking.
    pub fn set_status(
        &mut self,
        target: ProductStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ProductError> {
        use ProductStatus::*;
        let allowed = matches!(
            (self.status, target),
            (Draft, Active) | (Suspended, Active) | (Active, Draft) | (Active, Suspended)
                | (SoldOut, Suspended) | (Draft, Suspended)
        );
        if !allowed {
            return Err(ProductError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        if target == Active && self.inventory_count == 0 {
            return Err(ProductError::NoInventory);
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Take `quantity` units for a sale.
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), ProductError> {
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity);
        }
        // A sold-out product is still on sale, just out of stock.
        if !matches!(self.status, ProductStatus::Active | ProductStatus::SoldOut) {
            return Err(ProductError::NotPurchasable(self.status));
        }
        if self.inventory_count < quantity {
            return Err(ProductError::InsufficientInventory {
                requested: quantity,
                available: self.inventory_count,
            });
        }
        self.inventory_count -= quantity;
        self.sales_count = self.sales_count.saturating_add(quantity);
        if self.inventory_count == 0 {
            self.status = ProductStatus::SoldOut;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Hand back units from a sale whose payment failed.
    pub fn release(&mut self, quantity: u32, now: DateTime<Utc>) {
        self.inventory_count = self.inventory_count.saturating_add(quantity);
        self.sales_count = self.sales_count.saturating_sub(quantity);
        if self.status == ProductStatus::SoldOut && self.inventory_count > 0 {
            self.status = ProductStatus::Active;
        }
        self.updated_at = now;
    }

    /// Add stock. A sold-out product becomes active again.
    pub fn restock(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), ProductError> {
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity);
        }
        self.inventory_count = self.inventory_count.saturating_add(quantity);
        if self.status == ProductStatus::SoldOut {
            self.status = ProductStatus::Active;
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(inventory: u32) -> ProductDraft {
        ProductDraft {
            title: "Tote bag".to_string(),
            description: String::new(),
            category: "apparel".to_string(),
            price: dec!(10.00),
            inventory_count: inventory,
            images: vec![],
            tags: vec![],
            specifications: ProductSpecifications::default(),
        }
    }

    fn active(inventory: u32) -> Product {
        let mut p = Product::create(
            UserId::new(),
            ApplicationId::new(),
            AssetId::new(),
            draft(inventory),
            Utc::now(),
        )
        .unwrap();
        p.set_status(ProductStatus::Active, Utc::now()).unwrap();
        p
    }

    #[test]
    fn create_starts_in_draft() {
        let p = Product::create(
            UserId::new(),
            ApplicationId::new(),
            AssetId::new(),
            draft(5),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(p.status, ProductStatus::Draft);
        assert_eq!(p.sales_count, 0);
        assert!(p.status.holds_license());
    }

    #[test]
    fn zero_price_is_rejected() {
        let mut d = draft(1);
        d.price = dec!(0);
        assert_eq!(
            Product::create(UserId::new(), ApplicationId::new(), AssetId::new(), d, Utc::now())
                .unwrap_err(),
            ProductError::InvalidPrice(dec!(0))
        );
    }

    #[test]
    fn reserving_last_unit_sells_out() {
        let mut p = active(3);
        p.reserve(3, Utc::now()).unwrap();
        assert_eq!(p.inventory_count, 0);
        assert_eq!(p.sales_count, 3);
        assert_eq!(p.status, ProductStatus::SoldOut);
        assert_eq!(
            p.reserve(1, Utc::now()).unwrap_err(),
            ProductError::InsufficientInventory {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn over_reservation_changes_nothing() {
        let mut p = active(2);
        let before = p.clone();
        assert_eq!(
            p.reserve(3, Utc::now()).unwrap_err(),
            ProductError::InsufficientInventory {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(p, before);
    }

    #[test]
    fn draft_is_not_purchasable() {
        let mut p = Product::create(
            UserId::new(),
            ApplicationId::new(),
            AssetId::new(),
            draft(2),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            p.reserve(1, Utc::now()).unwrap_err(),
            ProductError::NotPurchasable(ProductStatus::Draft)
        );
    }

    #[test]
    fn release_reopens_sold_out_product() {
        let mut p = active(1);
        p.reserve(1, Utc::now()).unwrap();
        p.release(1, Utc::now());
        assert_eq!(p.status, ProductStatus::Active);
        assert_eq!(p.inventory_count, 1);
        assert_eq!(p.sales_count, 0);
    }

    #[test]
    fn restock_reactivates_and_sold_out_is_not_a_target() {
        let mut p = active(1);
        p.reserve(1, Utc::now()).unwrap();
        assert!(matches!(
            p.set_status(ProductStatus::Active, Utc::now()),
            Err(ProductError::InvalidTransition { .. })
        ));
        p.restock(4, Utc::now()).unwrap();
        assert_eq!(p.status, ProductStatus::Active);
        assert_eq!(p.inventory_count, 4);
    }

    #[test]
    fn activation_requires_inventory() {
        let mut p = Product::create(
            UserId::new(),
            ApplicationId::new(),
            AssetId::new(),
            draft(0),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            p.set_status(ProductStatus::Active, Utc::now()).unwrap_err(),
            ProductError::NoInventory
        );
    }

    #[test]
    fn edit_is_all_or_nothing() {
        let mut p = active(1);
        let before = p.clone();
        let err = p
            .edit(
                ProductEdit {
                    title: Some("New title".into()),
                    price: Some(dec!(-1)),
                    ..ProductEdit::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, ProductError::InvalidPrice(dec!(-1)));
        assert_eq!(p, before);
    }
}
