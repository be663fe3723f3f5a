//! Cross-cutting error taxonomy.

use crate::risk::RiskLevel;
use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the creation and admin paths.
///
/// Validation and risk blocks are terminal decisions, never retried.
/// Persistence failures surface in the transient class; the admission
/// gate has its own `TempFail` mapping for the same rule.
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("persistence failure: {0}")]
  Persistence(#[from] sqlx::Error),

  #[error("request blocked: {reason}")]
  RiskBlocked { reason: String, risk_level: RiskLevel },

  #[error("rate limit exceeded for {key}")]
  RateLimited { key: String },
}

impl IntoResponse for ServiceError {
  fn into_response(self) -> Response {
    match self {
      ServiceError::Validation(msg) => {
        (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
      }
      ServiceError::Persistence(e) => {
        tracing::error!("persistence failure: {e}");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({"error": "internal error"})),
        )
          .into_response()
      }
      ServiceError::RiskBlocked { reason, risk_level } => (
        StatusCode::FORBIDDEN,
        Json(json!({
          "error": "request blocked",
          "reason": reason,
          "risk_level": risk_level,
        })),
      )
        .into_response(),
      ServiceError::RateLimited { .. } => (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"error": "rate limit exceeded"})),
      )
        .into_response(),
    }
  }
}
