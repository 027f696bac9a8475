//! # Transactions API
//!
//! Read access for the parties to a sale, and refunds.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use rights_core::TransactionId;
use rights_settlement::Transaction;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::settlement;
use crate::error::AppError;
use crate::extractors::{actor, extract_validated_json, require_reason, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
    /// Partial refund. Omitted means the full amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
}

impl Validate for RefundRequest {
    fn validate(&self) -> Result<(), String> {
        require_reason(&self.reason)?;
        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err("amount must be positive".to_string());
            }
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/transactions", get(list_transactions))
        .route("/v1/transactions/:id", get(get_transaction))
        .route("/v1/transactions/:id/refund", post(refund))
}

/// GET /v1/transactions
async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user = actor(&headers)?;
    Ok(Json(settlement::list_transactions(&state, user)))
}

/// GET /v1/transactions/:id
async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    let user = actor(&headers)?;
    Ok(Json(settlement::get_transaction(&state, TransactionId(id), user)?))
}

/// POST /v1/transactions/:id/refund
async fn refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<Json<Transaction>, AppError> {
    let user = actor(&headers)?;
    let req = extract_validated_json(body)?;
    let txn = settlement::refund(&state, TransactionId(id), user, &req.reason, req.amount).await?;
    Ok(Json(txn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn refund_request_rules() {
        let ok = RefundRequest {
            reason: "damaged".into(),
            amount: Some(dec!(2.50)),
        };
        assert!(ok.validate().is_ok());
        let negative = RefundRequest {
            reason: "damaged".into(),
            amount: Some(dec!(-1)),
        };
        assert!(negative.validate().is_err());
        let blank = RefundRequest {
            reason: "".into(),
            amount: None,
        };
        assert!(blank.validate().is_err());
    }
}
