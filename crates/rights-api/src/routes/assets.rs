//! # Rights Registry API
//!
//! Asset registration and moderation, and the license terms published
//! against an asset.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rights_core::{AssetId, TermsId};
use rights_state::{AssetEdit, IpAsset, LicenseTerms, NewAsset, TermsDraft, VerificationStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::registry;
use crate::error::AppError;
use crate::extractors::{actor, extract_json, extract_validated_json, Validate};
use crate::state::AppState;

impl Validate for NewAsset {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    pub status: VerificationStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/assets", post(register_asset))
        .route(
            "/v1/assets/:id",
            get(get_asset).put(update_asset).delete(delete_asset),
        )
        .route("/v1/assets/:id/moderation", post(moderate_asset))
        .route("/v1/assets/:id/terms", post(publish_terms).get(list_terms))
        .route("/v1/terms/:id", put(update_terms))
        .route("/v1/terms/:id/deactivate", post(deactivate_terms))
}

/// POST /v1/assets
async fn register_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewAsset>, JsonRejection>,
) -> Result<(StatusCode, Json<IpAsset>), AppError> {
    let user = actor(&headers)?;
    let fields = extract_validated_json(body)?;
    let asset = registry::register_asset(&state, user, fields)?;
    Ok((StatusCode::CREATED, Json(asset)))
}

/// GET /v1/assets/:id
async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IpAsset>, AppError> {
    Ok(Json(registry::get_asset(&state, AssetId(id))?))
}

/// PUT /v1/assets/:id
async fn update_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<AssetEdit>, JsonRejection>,
) -> Result<Json<IpAsset>, AppError> {
    let user = actor(&headers)?;
    let edit = extract_json(body)?;
    Ok(Json(registry::update_asset(&state, AssetId(id), user, edit)?))
}

/// DELETE /v1/assets/:id
async fn delete_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = actor(&headers)?;
    registry::delete_asset(&state, AssetId(id), user)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/assets/:id/moderation (admin)
async fn moderate_asset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<ModerationRequest>, JsonRejection>,
) -> Result<Json<IpAsset>, AppError> {
    let user = actor(&headers)?;
    let req = extract_json(body)?;
    Ok(Json(registry::moderate_asset(&state, AssetId(id), user, req.status)?))
}

/// POST /v1/assets/:id/terms
async fn publish_terms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<TermsDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseTerms>), AppError> {
    let user = actor(&headers)?;
    let draft = extract_json(body)?;
    let terms = registry::publish_terms(&state, AssetId(id), user, draft)?;
    Ok((StatusCode::CREATED, Json(terms)))
}

/// GET /v1/assets/:id/terms
async fn list_terms(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LicenseTerms>>, AppError> {
    Ok(Json(registry::list_terms(&state, AssetId(id))?))
}

/// PUT /v1/terms/:id
async fn update_terms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<TermsDraft>, JsonRejection>,
) -> Result<Json<LicenseTerms>, AppError> {
    let user = actor(&headers)?;
    let draft = extract_json(body)?;
    Ok(Json(registry::update_terms(&state, TermsId(id), user, draft)?))
}

/// POST /v1/terms/:id/deactivate
async fn deactivate_terms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LicenseTerms>, AppError> {
    let user = actor(&headers)?;
    Ok(Json(registry::deactivate_terms(&state, TermsId(id), user)?))
}
