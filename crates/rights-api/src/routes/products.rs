//! # Products API
//!
//! Products made under a license, their purchase, and the authorization
//! chains issued for them.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rights_chain::AuthorizationChain;
use rights_core::{ApplicationId, ChainId, ProductId};
use rights_settlement::Transaction;
use rights_state::{Product, ProductDraft, ProductEdit, ProductStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::products::{self, ProductStats};
use crate::engine::settlement::{self, PurchaseRequest};
use crate::engine::chains;
use crate::error::AppError;
use crate::extractors::{actor, extract_json, extract_validated_json, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub license_id: ApplicationId,
    #[serde(flatten)]
    pub product: ProductDraft,
}

impl Validate for CreateProductRequest {
    fn validate(&self) -> Result<(), String> {
        if self.product.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ProductStatus,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

impl Validate for RestockRequest {
    fn validate(&self) -> Result<(), String> {
        if self.quantity == 0 {
            return Err("quantity must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Validate for PurchaseRequest {
    fn validate(&self) -> Result<(), String> {
        if self.quantity == 0 {
            return Err("quantity must be greater than 0".to_string());
        }
        if self.payment_method.trim().is_empty() {
            return Err("payment_method must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct DerivativeRequest {
    pub parent_chain_id: ChainId,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/products", post(create_product))
        .route(
            "/v1/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/v1/products/:id/stats", get(product_stats))
        .route("/v1/products/:id/status", post(set_status))
        .route("/v1/products/:id/restock", post(restock))
        .route("/v1/products/:id/purchase", post(purchase))
        .route("/v1/products/:id/chains", get(history).post(issue_derivative))
}

/// POST /v1/products
async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    let product = products::create_product(&state, user, req.license_id, req.product)?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /v1/products/:id
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(products::get_product(&state, ProductId(id))?))
}

/// PUT /v1/products/:id
async fn update_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<ProductEdit>, JsonRejection>,
) -> Result<Json<Product>, AppError> {
    let user = actor(&headers)?;
    let edit = extract_json(body)?;
    Ok(Json(products::update_product(&state, ProductId(id), user, edit)?))
}

/// DELETE /v1/products/:id
async fn delete_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = actor(&headers)?;
    products::delete_product(&state, ProductId(id), user)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/products/:id/stats
async fn product_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductStats>, AppError> {
    let user = actor(&headers)?;
    Ok(Json(products::product_stats(&state, ProductId(id), user)?))
}

/// POST /v1/products/:id/status
async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Product>, AppError> {
    let user = actor(&headers)?;
    let req = extract_json(body)?;
    Ok(Json(products::set_product_status(
        &state,
        ProductId(id),
        user,
        req.status,
    )?))
}

/// POST /v1/products/:id/restock
async fn restock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<RestockRequest>, JsonRejection>,
) -> Result<Json<Product>, AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    Ok(Json(products::restock(&state, ProductId(id), user, req.quantity)?))
}

/// POST /v1/products/:id/purchase
///
/// Answers 201 with the pending transaction; payment settles afterwards.
async fn purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    let txn = settlement::purchase(&state, ProductId(id), user, req)?;
    Ok((StatusCode::CREATED, Json(txn)))
}

/// GET /v1/products/:id/chains
async fn history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuthorizationChain>>, AppError> {
    Ok(Json(chains::history(&state, ProductId(id))?))
}

/// POST /v1/products/:id/chains
async fn issue_derivative(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<DerivativeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthorizationChain>), AppError> {
    let user = actor(&headers)?;
    let req = extract_json(body)?;
    let chain = chains::issue_derivative(&state, ProductId(id), req.parent_chain_id, user).await?;
    Ok((StatusCode::CREATED, Json(chain)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_flattens_product_fields() {
        let license = Uuid::new_v4();
        let req: CreateProductRequest = serde_json::from_str(&format!(
            r#"{{"license_id":"{license}","title":"Mug","price":"9.50","inventory_count":4}}"#
        ))
        .unwrap();
        assert_eq!(req.license_id, ApplicationId(license));
        assert_eq!(req.product.title, "Mug");
        assert_eq!(req.product.inventory_count, 4);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn purchase_request_rules() {
        let req: PurchaseRequest =
            serde_json::from_str(r#"{"quantity":0,"payment_method":"card"}"#).unwrap();
        assert!(req.validate().is_err());
        let req: PurchaseRequest =
            serde_json::from_str(r#"{"quantity":1,"payment_method":" "}"#).unwrap();
        assert!(req.validate().is_err());
        let req: PurchaseRequest =
            serde_json::from_str(r#"{"quantity":2,"payment_method":"card"}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn restock_needs_units() {
        assert!(RestockRequest { quantity: 0 }.validate().is_err());
        assert!(RestockRequest { quantity: 5 }.validate().is_ok());
    }
}
