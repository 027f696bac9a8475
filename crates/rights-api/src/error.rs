//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Every engine error arrives as a [`RightsError`] and is mapped here to an
//! HTTP status and a JSON body. Internal error details are never returned
//! to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rights_core::RightsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "CONFLICT").
    pub code: String,
    pub message: String,
    /// Additional context, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request well-formed but rejected by the engine (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or path could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No acting user on the request (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Acting user may not do this (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough stock (409, with the numbers in `details`).
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    /// License past its validity window (410).
    #[error("expired: {0}")]
    Expired(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::InsufficientInventory { .. } => (StatusCode::CONFLICT, "INSUFFICIENT_INVENTORY"),
            Self::Expired(_) => (StatusCode::GONE, "EXPIRED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientInventory {
                requested,
                available,
            } => Some(serde_json::json!({
                "requested": requested,
                "available": available,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RightsError> for AppError {
    fn from(err: RightsError) -> Self {
        match err {
            RightsError::NotFound { kind, id } => Self::NotFound(format!("{kind} {id}")),
            RightsError::Forbidden(msg) => Self::Forbidden(msg),
            RightsError::Conflict(msg) => Self::Conflict(msg),
            RightsError::InsufficientInventory {
                requested,
                available,
            } => Self::InsufficientInventory {
                requested,
                available,
            },
            RightsError::Expired(msg) => Self::Expired(msg),
            RightsError::InvalidInput(msg) => Self::Validation(msg),
            RightsError::Internal(msg) => Self::Internal(msg),
        }
    }
}
