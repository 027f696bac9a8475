//! # Custom Extractors & Validation
//!
//! The [`Validate`] trait for request DTOs, helpers to extract and validate
//! JSON bodies in handlers, and [`actor`], which reads the acting user.
//!
//! Credential verification happens upstream. By the time a request reaches
//! this service the gateway has put the authenticated user's id in the
//! `x-actor-id` header.

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::Json;
use rights_core::UserId;
use uuid::Uuid;

use crate::error::AppError;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Business rules a request must satisfy beyond what serde checks.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// The acting user. Missing or malformed header is 401.
pub fn actor(headers: &HeaderMap) -> Result<UserId, AppError> {
    let raw = headers
        .get(ACTOR_HEADER)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {ACTOR_HEADER} header")))?;
    let text = raw
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("{ACTOR_HEADER} is not valid text")))?;
    let id = text
        .trim()
        .trim_start_matches("user:")
        .parse::<Uuid>()
        .map_err(|_| AppError::Unauthorized(format!("{ACTOR_HEADER} is not a user id")))?;
    Ok(UserId(id))
}

/// Shared check for requests that carry a free-text reason.
pub fn require_reason(reason: &str) -> Result<(), String> {
    if reason.trim().is_empty() {
        return Err("reason must not be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn actor_accepts_bare_and_prefixed_ids() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(actor(&headers).unwrap(), UserId(id));

        headers.insert(
            ACTOR_HEADER,
            HeaderValue::from_str(&format!("user:{id}")).unwrap(),
        );
        assert_eq!(actor(&headers).unwrap(), UserId(id));
    }

    #[test]
    fn missing_or_garbage_actor_is_unauthorized() {
        assert!(matches!(
            actor(&HeaderMap::new()),
            Err(AppError::Unauthorized(_))
        ));
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("alice"));
        assert!(matches!(actor(&headers), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn blank_reason_fails() {
        assert!(require_reason("  ").is_err());
        assert!(require_reason("breach of terms").is_ok());
    }
}
