//! # License Workflow API
//!
//! Applications against published terms and their
//! `pending → approved | rejected`, `approved → revoked` lifecycle.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rights_core::{ApplicationId, UserId};
use rights_state::LicenseApplication;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::workflow::{self, ApplyRequest};
use crate::error::AppError;
use crate::extractors::{actor, extract_json, extract_validated_json, require_reason, Validate};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

impl Validate for ReasonRequest {
    fn validate(&self) -> Result<(), String> {
        require_reason(&self.reason)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/licenses", post(apply))
        .route("/v1/licenses/:id", get(get_application))
        .route("/v1/licenses/:id/approve", post(approve))
        .route("/v1/licenses/:id/reject", post(reject))
        .route("/v1/licenses/:id/revoke", post(revoke))
        .route("/v1/licenses/:id/verify", get(verify))
        .route("/v1/users/:id/licenses", get(list_user_licenses))
}

/// POST /v1/licenses
async fn apply(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseApplication>), AppError> {
    let user = actor(&headers)?;
    let req = extract_json(body)?;
    let application = workflow::apply(&state, user, req)?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// GET /v1/licenses/:id
async fn get_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LicenseApplication>, AppError> {
    let user = actor(&headers)?;
    Ok(Json(workflow::get_application(&state, ApplicationId(id), user)?))
}

/// POST /v1/licenses/:id/approve
///
/// The body is optional; an empty request approves without notes.
async fn approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<LicenseApplication>, AppError> {
    let user = actor(&headers)?;
    let notes = body.and_then(|Json(req)| req.notes);
    Ok(Json(workflow::approve(&state, ApplicationId(id), user, notes)?))
}

/// POST /v1/licenses/:id/reject
async fn reject(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<Json<LicenseApplication>, AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    Ok(Json(workflow::reject(&state, ApplicationId(id), user, &req.reason)?))
}

/// POST /v1/licenses/:id/revoke
async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<Json<LicenseApplication>, AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    Ok(Json(workflow::revoke(&state, ApplicationId(id), user, &req.reason)?))
}

/// GET /v1/licenses/:id/verify
async fn verify(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LicenseApplication>, AppError> {
    Ok(Json(workflow::verify(&state, ApplicationId(id))?))
}

/// GET /v1/users/:id/licenses
async fn list_user_licenses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LicenseApplication>>, AppError> {
    let viewer = actor(&headers)?;
    Ok(Json(workflow::list_user_licenses(&state, UserId(id), viewer)?))
}
