//! # Authorization Chain API
//!
//! `GET /v1/verify/:code` is the public provenance check and needs no
//! acting user. Revocation does.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use rights_chain::{AuthorizationChain, ChainVerdict};
use rights_core::ChainId;
use uuid::Uuid;

use crate::engine::chains;
use crate::error::AppError;
use crate::extractors::{actor, extract_validated_json};
use crate::routes::licenses::ReasonRequest;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/verify/:code", get(verify_by_code))
        .route("/v1/chains/:id/revoke", post(revoke_chain))
}

/// GET /v1/verify/:code
///
/// 200 for any known code. Whether the chain currently authorizes its
/// product is in the body's `valid` and `reason` fields.
async fn verify_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ChainVerdict>, AppError> {
    Ok(Json(chains::verify_by_code(&state, &code).await?))
}

/// POST /v1/chains/:id/revoke
async fn revoke_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<Json<AuthorizationChain>, AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    Ok(Json(chains::revoke_chain(&state, ChainId(id), user, &req.reason)?))
}
