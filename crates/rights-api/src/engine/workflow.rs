//! # License Workflow
//!
//! ```text
//!            apply                approve
//!   (none) ───────▶ PENDING ─────────────▶ APPROVED ──revoke──▶ REVOKED
//!                      │     (auto_approve)   ▲
//!                      │ ─────────────────────┘
//!                      └──reject──▶ REJECTED
//! ```
//!
//! Capacity is a counter on the terms row. Approval, auto-approval and
//! revocation hold that row while they check and move the counter and
//! write the application, so a capped pool can never be oversold.

use std::collections::BTreeMap;

use chrono::Utc;
use rights_core::{ApplicationId, AssetId, RightsError, TermsId, UserId};
use rights_state::{ApplicationStatus, LicenseApplication, Role, TermsError};
use serde::Deserialize;

use super::notify;
use crate::db::documents::DocumentTable;
use crate::guard;
use crate::notify::NotificationEvent;
use crate::state::AppState;

const AUTO_APPROVAL_NOTE: &str = "approved automatically under the published terms";

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyRequest {
    pub asset_id: AssetId,
    pub terms_id: TermsId,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// File an application, or approve it on the spot when the terms say so.
pub fn apply(
    state: &AppState,
    applicant: UserId,
    req: ApplyRequest,
) -> Result<LicenseApplication, RightsError> {
    guard::require_role(
        &*state.identity,
        applicant,
        &[Role::Creator, Role::SecondaryCreator],
    )?;

    let asset_row = state
        .assets
        .row(&req.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", req.asset_id))?;
    let asset = asset_row.lock();
    if !asset.is_licensable() {
        return Err(RightsError::Conflict(format!(
            "asset is not open for licensing (verification {}, status {})",
            asset.verification_status, asset.status
        )));
    }
    if asset.is_owned_by(applicant) {
        return Err(RightsError::InvalidInput(
            "cannot apply for a license on your own asset".to_string(),
        ));
    }

    let terms_row = state
        .terms
        .row(&req.terms_id.0)
        .ok_or_else(|| RightsError::not_found("terms", req.terms_id))?;
    let mut terms = terms_row.lock();
    if terms.asset_id != asset.id {
        return Err(RightsError::InvalidInput(
            "terms do not belong to this asset".to_string(),
        ));
    }
    if !terms.is_active {
        return Err(TermsError::Inactive.into());
    }
    let duplicate = state.applications.any(|a| {
        a.asset_id == asset.id && a.applicant_id == applicant && a.status.is_open()
    });
    if duplicate {
        return Err(RightsError::Conflict(
            "an open application for this asset already exists".to_string(),
        ));
    }

    let now = Utc::now();
    let mut application = LicenseApplication::submit(
        asset.id,
        applicant,
        terms.id,
        req.message,
        req.extra,
        now,
    );
    let auto = terms.auto_approve;
    if auto {
        application.approve(
            asset.creator_id,
            terms.license_expiry(now),
            Some(AUTO_APPROVAL_NOTE.to_string()),
            now,
        )?;
        terms.claim_slot()?;
    }
    state
        .applications
        .insert(application.id.0, application.clone());
    let owner = asset.creator_id;
    drop(terms);
    drop(asset);

    tracing::info!(
        application_id = %application.id,
        asset_id = %application.asset_id,
        applicant = %applicant,
        status = %application.status,
        "license application filed"
    );
    if auto {
        state.persist(DocumentTable::Terms, req.terms_id.0);
    }
    state.persist(DocumentTable::Applications, application.id.0);
    notify(
        state,
        owner,
        NotificationEvent::ApplicationSubmitted {
            application_id: application.id,
            asset_id: application.asset_id,
            applicant_id: applicant,
        },
    );
    if auto {
        notify(
            state,
            applicant,
            NotificationEvent::ApplicationApproved {
                application_id: application.id,
                asset_id: application.asset_id,
            },
        );
    }
    Ok(application)
}

fn load(state: &AppState, id: ApplicationId) -> Result<LicenseApplication, RightsError> {
    state
        .applications
        .get(&id.0)
        .ok_or_else(|| RightsError::not_found("license", id))
}

fn asset_owner(state: &AppState, asset_id: AssetId) -> Result<UserId, RightsError> {
    state
        .assets
        .get(&asset_id.0)
        .map(|a| a.creator_id)
        .ok_or_else(|| RightsError::not_found("asset", asset_id))
}

/// PENDING → APPROVED, taking one capacity slot.
pub fn approve(
    state: &AppState,
    id: ApplicationId,
    approver: UserId,
    notes: Option<String>,
) -> Result<LicenseApplication, RightsError> {
    let current = load(state, id)?;
    guard::require_owner_or_admin(
        &*state.identity,
        approver,
        asset_owner(state, current.asset_id)?,
    )?;

    let asset_row = state
        .assets
        .row(&current.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", current.asset_id))?;
    let asset = asset_row.lock();
    if !asset.is_approved() {
        return Err(RightsError::Conflict(format!(
            "asset verification is {}",
            asset.verification_status
        )));
    }
    let terms_row = state
        .terms
        .row(&current.terms_id.0)
        .ok_or_else(|| RightsError::not_found("terms", current.terms_id))?;
    let mut terms = terms_row.lock();
    let app_row = state
        .applications
        .row(&id.0)
        .ok_or_else(|| RightsError::not_found("license", id))?;
    let mut application = app_row.lock();

    let now = Utc::now();
    let mut draft = application.clone();
    draft.approve(approver, terms.license_expiry(now), notes, now)?;
    terms.claim_slot()?;
    *application = draft;
    let snapshot = application.clone();
    drop(application);
    drop(terms);
    drop(asset);

    tracing::info!(
        application_id = %id,
        approver = %approver,
        expires_at = ?snapshot.expires_at,
        "license approved"
    );
    state.persist(DocumentTable::Terms, snapshot.terms_id.0);
    state.persist(DocumentTable::Applications, id.0);
    notify(
        state,
        snapshot.applicant_id,
        NotificationEvent::ApplicationApproved {
            application_id: id,
            asset_id: snapshot.asset_id,
        },
    );
    Ok(snapshot)
}

/// PENDING → REJECTED.
pub fn reject(
    state: &AppState,
    id: ApplicationId,
    actor: UserId,
    reason: &str,
) -> Result<LicenseApplication, RightsError> {
    let current = load(state, id)?;
    guard::require_owner_or_admin(&*state.identity, actor, asset_owner(state, current.asset_id)?)?;

    let snapshot = state
        .applications
        .try_update(&id.0, |a| {
            a.reject(actor, reason, Utc::now())?;
            Ok::<_, RightsError>(a.clone())
        })
        .ok_or_else(|| RightsError::not_found("license", id))??;

    tracing::info!(application_id = %id, actor = %actor, "license application rejected");
    state.persist(DocumentTable::Applications, id.0);
    notify(
        state,
        snapshot.applicant_id,
        NotificationEvent::ApplicationRejected {
            application_id: id,
            reason: snapshot.rejection_reason.clone().unwrap_or_default(),
        },
    );
    Ok(snapshot)
}

/// APPROVED → REVOKED, returning the capacity slot.
///
/// Refused while any draft or active product is made under the license.
/// Authorization chains are left as they are; they fail verification
/// from now on because the license is no longer approved.
pub fn revoke(
    state: &AppState,
    id: ApplicationId,
    actor: UserId,
    reason: &str,
) -> Result<LicenseApplication, RightsError> {
    let current = load(state, id)?;
    guard::require_owner_or_admin(&*state.identity, actor, asset_owner(state, current.asset_id)?)?;

    let terms_row = state
        .terms
        .row(&current.terms_id.0)
        .ok_or_else(|| RightsError::not_found("terms", current.terms_id))?;
    let mut terms = terms_row.lock();
    let app_row = state
        .applications
        .row(&id.0)
        .ok_or_else(|| RightsError::not_found("license", id))?;
    let mut application = app_row.lock();

    let mut draft = application.clone();
    draft.revoke(actor, reason, Utc::now())?;
    let live_products = state
        .products
        .any(|p| p.license_id == id && p.status.holds_license());
    if live_products {
        return Err(RightsError::Conflict(
            "license has draft or active products".to_string(),
        ));
    }
    terms.release_slot();
    *application = draft;
    let snapshot = application.clone();
    drop(application);
    drop(terms);

    tracing::info!(application_id = %id, actor = %actor, "license revoked");
    state.persist(DocumentTable::Terms, snapshot.terms_id.0);
    state.persist(DocumentTable::Applications, id.0);
    notify(
        state,
        snapshot.applicant_id,
        NotificationEvent::LicenseRevoked {
            application_id: id,
            reason: snapshot.revocation_reason.clone().unwrap_or_default(),
        },
    );
    Ok(snapshot)
}

/// Check a license is currently usable. Never changes stored status.
pub fn verify(state: &AppState, id: ApplicationId) -> Result<LicenseApplication, RightsError> {
    let license = load(state, id)?;
    license.check_valid(Utc::now())?;
    Ok(license)
}

/// Visible to the applicant, the asset owner and admins.
pub fn get_application(
    state: &AppState,
    id: ApplicationId,
    viewer: UserId,
) -> Result<LicenseApplication, RightsError> {
    let application = load(state, id)?;
    if application.applicant_id != viewer {
        guard::require_owner_or_admin(
            &*state.identity,
            viewer,
            asset_owner(state, application.asset_id)?,
        )?;
    }
    Ok(application)
}

/// Approved licenses held by `user`, newest first.
pub fn list_user_licenses(
    state: &AppState,
    user: UserId,
    viewer: UserId,
) -> Result<Vec<LicenseApplication>, RightsError> {
    guard::require_owner_or_admin(&*state.identity, viewer, user)?;
    let mut licenses = state
        .applications
        .filter(|a| a.applicant_id == user && a.status == ApplicationStatus::Approved);
    licenses.sort_by(|a, b| b.approved_at.cmp(&a.approved_at));
    Ok(licenses)
}
