//! # Products
//!
//! Sellable goods a licensee makes under an approved license. A product
//! starts in `draft`; its authorization chain is issued by the dispatcher
//! once the product exists.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rights_core::{ApplicationId, Money, ProductId, RightsError, UserId};
use rights_settlement::TransactionStatus;
use rights_state::{LicenseApplication, Product, ProductDraft, ProductEdit, ProductStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::documents::DocumentTable;
use crate::dispatch::Effect;
use crate::guard;
use crate::state::AppState;

fn load(state: &AppState, id: ProductId) -> Result<Product, RightsError> {
    state
        .products
        .get(&id.0)
        .ok_or_else(|| RightsError::not_found("product", id))
}

fn require_owner(product: &Product, user: UserId) -> Result<(), RightsError> {
    if !product.is_owned_by(user) {
        return Err(RightsError::Forbidden(
            "only the product creator may change it".to_string(),
        ));
    }
    Ok(())
}

fn license_row(
    state: &AppState,
    product: &Product,
) -> Result<Arc<Mutex<LicenseApplication>>, RightsError> {
    state
        .applications
        .row(&product.license_id.0)
        .ok_or_else(|| RightsError::not_found("license", product.license_id))
}

/// Create a draft product under `license_id`, which the licensee must hold
/// and which must currently be valid.
pub fn create_product(
    state: &AppState,
    licensee: UserId,
    license_id: ApplicationId,
    draft: ProductDraft,
) -> Result<Product, RightsError> {
    guard::require_active(&*state.identity, licensee)?;
    let license = state
        .applications
        .get(&license_id.0)
        .ok_or_else(|| RightsError::not_found("license", license_id))?;
    let asset = state
        .assets
        .get(&license.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", license.asset_id))?;
    if !asset.is_approved() {
        return Err(RightsError::Conflict(format!(
            "asset verification is {}",
            asset.verification_status
        )));
    }

    // Held until the product is in the table, so a concurrent revoke either
    // sees the product or runs first and makes the check below fail.
    let row = state
        .applications
        .row(&license_id.0)
        .ok_or_else(|| RightsError::not_found("license", license_id))?;
    let license = row.lock();
    if license.applicant_id != licensee {
        return Err(RightsError::Forbidden(
            "products can only be created under your own license".to_string(),
        ));
    }
    let now = Utc::now();
    license.check_valid(now)?;
    let product = Product::create(licensee, license.id, license.asset_id, draft, now)?;
    state.products.insert(product.id.0, product.clone());
    drop(license);

    tracing::info!(
        product_id = %product.id,
        license_id = %license_id,
        creator = %licensee,
        "product created"
    );
    state.persist(DocumentTable::Products, product.id.0);
    state.dispatcher.enqueue(Effect::IssueChain(product.id));
    Ok(product)
}

pub fn update_product(
    state: &AppState,
    id: ProductId,
    creator: UserId,
    edit: ProductEdit,
) -> Result<Product, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    require_owner(&load(state, id)?, creator)?;
    let snapshot = state
        .products
        .try_update(&id.0, |p| {
            p.edit(edit, Utc::now())?;
            Ok::<_, RightsError>(p.clone())
        })
        .ok_or_else(|| RightsError::not_found("product", id))??;

    tracing::info!(product_id = %id, "product updated");
    state.persist(DocumentTable::Products, id.0);
    Ok(snapshot)
}

/// Owner-driven status change. Activating requires the license to still
/// be valid.
pub fn set_product_status(
    state: &AppState,
    id: ProductId,
    creator: UserId,
    status: ProductStatus,
) -> Result<Product, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    let product = load(state, id)?;
    require_owner(&product, creator)?;

    // License before product, so a revoke cannot land between the check
    // and the status change.
    let row = license_row(state, &product)?;
    let license = row.lock();
    let now = Utc::now();
    if status == ProductStatus::Active {
        license.check_valid(now)?;
    }
    let snapshot = state
        .products
        .try_update(&id.0, |p| {
            p.set_status(status, now)?;
            Ok::<_, RightsError>(p.clone())
        })
        .ok_or_else(|| RightsError::not_found("product", id))??;
    drop(license);

    tracing::info!(
        product_id = %id,
        from = %product.status,
        to = %status,
        "product status changed"
    );
    state.persist(DocumentTable::Products, id.0);
    Ok(snapshot)
}

pub fn restock(
    state: &AppState,
    id: ProductId,
    creator: UserId,
    quantity: u32,
) -> Result<Product, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    let product = load(state, id)?;
    require_owner(&product, creator)?;

    let row = license_row(state, &product)?;
    let license = row.lock();
    let now = Utc::now();
    let snapshot = state
        .products
        .try_update(&id.0, |p| {
            // Restocking a sold-out product puts it back on sale.
            if p.status == ProductStatus::SoldOut {
                license.check_valid(now)?;
            }
            p.restock(quantity, now)?;
            Ok::<_, RightsError>(p.clone())
        })
        .ok_or_else(|| RightsError::not_found("product", id))??;
    drop(license);

    tracing::info!(
        product_id = %id,
        quantity,
        inventory = snapshot.inventory_count,
        "product restocked"
    );
    state.persist(DocumentTable::Products, id.0);
    Ok(snapshot)
}

/// Remove a product that has never completed a sale. Its active chains
/// are deactivated.
pub fn delete_product(state: &AppState, id: ProductId, actor: UserId) -> Result<(), RightsError> {
    let product = load(state, id)?;
    guard::require_owner_or_admin(&*state.identity, actor, product.creator_id)?;

    let row = state
        .products
        .row(&id.0)
        .ok_or_else(|| RightsError::not_found("product", id))?;
    let mut held = row.lock();
    let sold = state.transactions.any(|t| {
        t.product_id == Some(id)
            && matches!(
                t.status,
                TransactionStatus::Pending | TransactionStatus::Completed
            )
    });
    if sold {
        return Err(RightsError::Conflict(
            "cannot delete a product with sales".to_string(),
        ));
    }
    let now = Utc::now();
    // A purchase that fetched the row handle before the removal still
    // locks the detached row after us; it must find nothing on sale.
    held.status = ProductStatus::Suspended;
    held.updated_at = now;
    state.products.detach(&id.0);
    let retired: Vec<_> = state
        .chains
        .filter(|c| c.product_id == id && c.is_active)
        .into_iter()
        .filter_map(|c| {
            match state.chains.try_update(&c.id.0, |c| c.revoke("product deleted", now)) {
                Some(Ok(())) => Some(c.id),
                _ => None,
            }
        })
        .collect();
    drop(held);

    tracing::info!(product_id = %id, actor = %actor, chains = retired.len(), "product deleted");
    state.persist(DocumentTable::Products, id.0);
    for chain_id in retired {
        state.persist(DocumentTable::Chains, chain_id.0);
    }
    Ok(())
}

/// Fetch a product, counting the view.
pub fn get_product(state: &AppState, id: ProductId) -> Result<Product, RightsError> {
    state
        .products
        .update(&id.0, |p| p.view_count = p.view_count.saturating_add(1))
        .ok_or_else(|| RightsError::not_found("product", id))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStats {
    pub product_id: ProductId,
    pub units_sold: u32,
    pub completed_orders: u32,
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub view_count: u64,
}

/// Sales figures over completed transactions. Creator or admin only.
pub fn product_stats(
    state: &AppState,
    id: ProductId,
    viewer: UserId,
) -> Result<ProductStats, RightsError> {
    let product = load(state, id)?;
    guard::require_owner_or_admin(&*state.identity, viewer, product.creator_id)?;

    let completed = state.transactions.filter(|t| {
        t.product_id == Some(id) && t.status == TransactionStatus::Completed
    });
    let mut units_sold = 0u32;
    let mut total_revenue = Money::zero();
    for txn in &completed {
        units_sold = units_sold.saturating_add(txn.metadata.quantity);
        total_revenue = total_revenue
            .checked_add(txn.amount)
            .map_err(|e| RightsError::Internal(e.to_string()))?;
    }
    let orders = u32::try_from(completed.len()).unwrap_or(u32::MAX);
    let average_order_value = if orders == 0 {
        Money::zero()
    } else {
        let avg = total_revenue.amount() / Decimal::from(orders);
        Money::new(avg)
            .map_err(|e| RightsError::Internal(e.to_string()))?
            .round_minor()
    };

    Ok(ProductStats {
        product_id: id,
        units_sold,
        completed_orders: orders,
        total_revenue,
        average_order_value,
        view_count: product.view_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{registry, workflow};
    use crate::guard::InMemoryDirectory;
    use crate::state::Collaborators;
    use rights_core::AssetId;
    use rights_state::{LicenseType, NewAsset, Role, TermsDraft, VerificationStatus};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct World {
        state: AppState,
        owner: UserId,
        licensee: UserId,
        license_id: ApplicationId,
        asset_id: AssetId,
        admin: UserId,
    }

    fn world() -> World {
        let dir = Arc::new(InMemoryDirectory::new());
        let state = AppState::with_config(
            Default::default(),
            Collaborators {
                identity: dir.clone(),
                ..Collaborators::default()
            },
            None,
        );
        let owner = dir.add(Role::Creator, "owner");
        let admin = dir.add(Role::Admin, "admin");
        let licensee = dir.add(Role::SecondaryCreator, "licensee");
        let asset = registry::register_asset(
            &state,
            owner,
            NewAsset {
                title: "Logo".into(),
                ..NewAsset::default()
            },
        )
        .unwrap();
        registry::moderate_asset(&state, asset.id, admin, VerificationStatus::Approved).unwrap();
        let terms = registry::publish_terms(
            &state,
            asset.id,
            owner,
            TermsDraft {
                license_type: LicenseType::Standard,
                revenue_share_percent: dec!(20),
                base_fee: dec!(0),
                territory: None,
                duration: None,
                requirements: None,
                restrictions: None,
                auto_approve: true,
                max_licenses: 0,
            },
        )
        .unwrap();
        let license = workflow::apply(
            &state,
            licensee,
            workflow::ApplyRequest {
                asset_id: asset.id,
                terms_id: terms.id,
                message: None,
                extra: BTreeMap::new(),
            },
        )
        .unwrap();
        World {
            state,
            owner,
            licensee,
            license_id: license.id,
            asset_id: asset.id,
            admin,
        }
    }

    fn draft(inventory: u32) -> ProductDraft {
        ProductDraft {
            title: "Tote bag".into(),
            description: String::new(),
            category: "apparel".into(),
            price: dec!(10.00),
            inventory_count: inventory,
            images: vec![],
            tags: vec![],
            specifications: Default::default(),
        }
    }

    #[test]
    fn only_the_licensee_can_create() {
        let w = world();
        let err = create_product(&w.state, w.owner, w.license_id, draft(1)).unwrap_err();
        assert!(matches!(err, RightsError::Forbidden(_)));
        let product = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        assert_eq!(product.status, ProductStatus::Draft);
        assert_eq!(product.asset_id, w.asset_id);
    }

    #[test]
    fn revoked_license_blocks_creation_and_activation() {
        let w = world();
        let product = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        set_product_status(&w.state, product.id, w.licensee, ProductStatus::Suspended).unwrap();
        workflow::revoke(&w.state, w.license_id, w.owner, "breach").unwrap();

        let err = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap_err();
        assert!(err.is_conflict());
        let err =
            set_product_status(&w.state, product.id, w.licensee, ProductStatus::Active).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn activation_needs_inventory() {
        let w = world();
        let product = create_product(&w.state, w.licensee, w.license_id, draft(0)).unwrap();
        let err =
            set_product_status(&w.state, product.id, w.licensee, ProductStatus::Active).unwrap_err();
        assert!(err.is_conflict());
        restock(&w.state, product.id, w.licensee, 3).unwrap();
        let active =
            set_product_status(&w.state, product.id, w.licensee, ProductStatus::Active).unwrap();
        assert_eq!(active.inventory_count, 3);
    }

    #[test]
    fn update_is_all_or_nothing() {
        let w = world();
        let product = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        let err = update_product(
            &w.state,
            product.id,
            w.licensee,
            ProductEdit {
                title: Some("Renamed".into()),
                price: Some(dec!(0)),
                ..ProductEdit::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RightsError::InvalidInput(_)));
        assert_eq!(w.state.products.get(&product.id.0).unwrap().title, "Tote bag");
    }

    #[test]
    fn delete_unsold_product() {
        let w = world();
        let product = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        let stranger_err = delete_product(&w.state, product.id, w.owner).unwrap_err();
        assert!(matches!(stranger_err, RightsError::Forbidden(_)));
        delete_product(&w.state, product.id, w.admin).unwrap();
        assert!(get_product(&w.state, product.id).is_err());
        assert!(w.state.products.is_empty());
        // The table is still usable after a delete.
        let again = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        delete_product(&w.state, again.id, w.licensee).unwrap();
    }

    #[test]
    fn sold_out_product_under_revoked_license_cannot_restock() {
        let w = world();
        let product = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        set_product_status(&w.state, product.id, w.licensee, ProductStatus::Active).unwrap();
        w.state
            .products
            .update(&product.id.0, |p| p.reserve(1, Utc::now()).unwrap());
        workflow::revoke(&w.state, w.license_id, w.owner, "breach").unwrap();

        let err = restock(&w.state, product.id, w.licensee, 2).unwrap_err();
        assert!(err.is_conflict());
        let stored = w.state.products.get(&product.id.0).unwrap();
        assert_eq!(stored.status, ProductStatus::SoldOut);
        assert_eq!(stored.inventory_count, 0);
    }

    #[test]
    fn stats_start_empty() {
        let w = world();
        let product = create_product(&w.state, w.licensee, w.license_id, draft(1)).unwrap();
        get_product(&w.state, product.id).unwrap();
        let stats = product_stats(&w.state, product.id, w.licensee).unwrap();
        assert_eq!(stats.units_sold, 0);
        assert_eq!(stats.total_revenue, Money::zero());
        assert_eq!(stats.average_order_value, Money::zero());
        assert_eq!(stats.view_count, 1);
    }
}
