//! # Rights Registry
//!
//! Registration and moderation of IP assets, and publication of the terms
//! under which they may be licensed.

use chrono::Utc;
use rights_chain::AssetRegistration;
use rights_core::{AssetId, RightsError, TermsId, UserId};
use rights_state::{
    ApplicationStatus, AssetEdit, AssetStatus, IpAsset, LicenseTerms, NewAsset, Role, TermsDraft,
    VerificationStatus,
};

use crate::db::documents::DocumentTable;
use crate::dispatch::Effect;
use crate::guard;
use crate::state::AppState;

pub fn register_asset(
    state: &AppState,
    creator: UserId,
    fields: NewAsset,
) -> Result<IpAsset, RightsError> {
    guard::require_role(&*state.identity, creator, &[Role::Creator, Role::Admin])?;
    let asset = IpAsset::register(creator, fields, Utc::now())?;
    state.assets.insert(asset.id.0, asset.clone());

    tracing::info!(asset_id = %asset.id, creator = %creator, "asset registered");
    state.persist(DocumentTable::Assets, asset.id.0);
    state.dispatcher.enqueue(Effect::RecordAssetLedger(asset.id));
    Ok(asset)
}

/// Dispatcher effect: register the asset with the ledger and keep the hash.
pub async fn record_asset_on_ledger(state: &AppState, asset_id: AssetId) -> Result<(), RightsError> {
    let asset = state
        .assets
        .get(&asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", asset_id))?;
    if asset.ledger_hash.is_some() {
        return Ok(());
    }

    let receipt = state
        .ledger
        .record_asset_registration(&AssetRegistration {
            asset_id: asset.id,
            creator_id: asset.creator_id,
            title: asset.title.clone(),
            content_type: asset.content_type.clone(),
            registered_at: asset.created_at,
        })
        .await?;

    state.assets.update(&asset_id.0, |a| {
        if a.ledger_hash.is_none() {
            a.record_ledger_hash(receipt.hash.clone(), Utc::now());
        }
    });
    tracing::debug!(asset_id = %asset_id, hash = %receipt.hash, "asset recorded on ledger");
    state.persist(DocumentTable::Assets, asset_id.0);
    Ok(())
}

/// Apply a moderation outcome. Admin only.
pub fn moderate_asset(
    state: &AppState,
    asset_id: AssetId,
    moderator: UserId,
    status: VerificationStatus,
) -> Result<IpAsset, RightsError> {
    guard::require_admin(&*state.identity, moderator)?;
    let row = state
        .assets
        .row(&asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", asset_id))?;
    let mut asset = row.lock();
    let previous = asset.moderate(status, Utc::now());
    let snapshot = asset.clone();
    drop(asset);

    tracing::info!(
        asset_id = %asset_id,
        moderator = %moderator,
        from = %previous,
        to = %status,
        "asset moderated"
    );
    state.persist(DocumentTable::Assets, asset_id.0);
    Ok(snapshot)
}

/// Edit an asset's descriptive fields. Owner only. A new title or
/// description returns the asset to moderation.
pub fn update_asset(
    state: &AppState,
    asset_id: AssetId,
    creator: UserId,
    edit: AssetEdit,
) -> Result<IpAsset, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    let snapshot = state
        .assets
        .try_update(&asset_id.0, |a| {
            if !a.is_owned_by(creator) {
                return Err(RightsError::Forbidden(
                    "only the asset owner may update it".to_string(),
                ));
            }
            a.edit(edit, Utc::now())?;
            Ok(a.clone())
        })
        .ok_or_else(|| RightsError::not_found("asset", asset_id))??;

    tracing::info!(
        asset_id = %asset_id,
        verification = %snapshot.verification_status,
        "asset updated"
    );
    state.persist(DocumentTable::Assets, asset_id.0);
    Ok(snapshot)
}

/// Remove an asset. Owner or admin. Refused while any license on it is
/// approved.
pub fn delete_asset(state: &AppState, asset_id: AssetId, actor: UserId) -> Result<(), RightsError> {
    let owner = state
        .assets
        .get(&asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", asset_id))?
        .creator_id;
    guard::require_owner_or_admin(&*state.identity, actor, owner)?;

    // Approvals lock the asset row first, so none can land while it is held.
    let row = state
        .assets
        .row(&asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", asset_id))?;
    let mut asset = row.lock();
    let licensed = state
        .applications
        .any(|a| a.asset_id == asset_id && a.status == ApplicationStatus::Approved);
    if licensed {
        return Err(RightsError::Conflict(
            "cannot delete an asset with active licenses".to_string(),
        ));
    }
    // Late holders of the row handle must find it closed to licensing.
    asset.status = AssetStatus::Archived;
    asset.updated_at = Utc::now();
    state.assets.detach(&asset_id.0);
    drop(asset);

    tracing::info!(asset_id = %asset_id, actor = %actor, "asset deleted");
    state.persist(DocumentTable::Assets, asset_id.0);
    Ok(())
}

/// Fetch an asset, counting the view.
pub fn get_asset(state: &AppState, asset_id: AssetId) -> Result<IpAsset, RightsError> {
    state
        .assets
        .update(&asset_id.0, |a| a.view_count = a.view_count.saturating_add(1))
        .ok_or_else(|| RightsError::not_found("asset", asset_id))
}

pub fn publish_terms(
    state: &AppState,
    asset_id: AssetId,
    creator: UserId,
    draft: TermsDraft,
) -> Result<LicenseTerms, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    let row = state
        .assets
        .row(&asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", asset_id))?;
    let asset = row.lock();
    if !asset.is_owned_by(creator) {
        return Err(RightsError::Forbidden(
            "only the asset owner may publish terms".to_string(),
        ));
    }
    if !asset.is_approved() {
        return Err(RightsError::Conflict(format!(
            "asset verification is {}",
            asset.verification_status
        )));
    }
    let terms = LicenseTerms::publish(asset.id, draft, Utc::now())?;
    state.terms.insert(terms.id.0, terms.clone());
    drop(asset);

    tracing::info!(
        terms_id = %terms.id,
        asset_id = %asset_id,
        license_type = %terms.license_type,
        max_licenses = terms.max_licenses,
        "license terms published"
    );
    state.persist(DocumentTable::Terms, terms.id.0);
    Ok(terms)
}

/// Owner of the asset the terms belong to.
fn terms_owner(state: &AppState, terms_id: TermsId) -> Result<UserId, RightsError> {
    let terms = state
        .terms
        .get(&terms_id.0)
        .ok_or_else(|| RightsError::not_found("terms", terms_id))?;
    let asset = state
        .assets
        .get(&terms.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", terms.asset_id))?;
    Ok(asset.creator_id)
}

/// Revise terms. Refused while any application against them is pending;
/// `apply` files pending applications under the same terms row lock.
pub fn update_terms(
    state: &AppState,
    terms_id: TermsId,
    creator: UserId,
    draft: TermsDraft,
) -> Result<LicenseTerms, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    if terms_owner(state, terms_id)? != creator {
        return Err(RightsError::Forbidden(
            "only the asset owner may update terms".to_string(),
        ));
    }

    let row = state
        .terms
        .row(&terms_id.0)
        .ok_or_else(|| RightsError::not_found("terms", terms_id))?;
    let mut terms = row.lock();
    let pending = state
        .applications
        .any(|a| a.terms_id == terms_id && a.status == ApplicationStatus::Pending);
    if pending {
        return Err(RightsError::Conflict(
            "terms cannot change while applications are pending".to_string(),
        ));
    }
    terms.revise(draft, Utc::now())?;
    let snapshot = terms.clone();
    drop(terms);

    tracing::info!(terms_id = %terms_id, "license terms updated");
    state.persist(DocumentTable::Terms, terms_id.0);
    Ok(snapshot)
}

pub fn deactivate_terms(
    state: &AppState,
    terms_id: TermsId,
    creator: UserId,
) -> Result<LicenseTerms, RightsError> {
    guard::require_active(&*state.identity, creator)?;
    if terms_owner(state, terms_id)? != creator {
        return Err(RightsError::Forbidden(
            "only the asset owner may deactivate terms".to_string(),
        ));
    }
    let snapshot = state
        .terms
        .update(&terms_id.0, |t| t.deactivate(Utc::now()))
        .ok_or_else(|| RightsError::not_found("terms", terms_id))?;

    tracing::info!(terms_id = %terms_id, "license terms deactivated");
    state.persist(DocumentTable::Terms, terms_id.0);
    Ok(snapshot)
}

/// Terms published for an asset, oldest first.
pub fn list_terms(state: &AppState, asset_id: AssetId) -> Result<Vec<LicenseTerms>, RightsError> {
    if state.assets.row(&asset_id.0).is_none() {
        return Err(RightsError::not_found("asset", asset_id));
    }
    let mut terms = state.terms.filter(|t| t.asset_id == asset_id);
    terms.sort_by_key(|t| t.created_at);
    Ok(terms)
}
