//! Privileged admin surface: rolling stats, blocklist management.

use crate::{
  app::AppState,
  error::ServiceError,
  models::blocked::blocked_entity::{BlockedEntity, EntityType},
};
use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use tracing::error;

/// Bearer-token gate. With no token configured the surface stays closed.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
  let Some(expected) = state.admin_token.as_deref() else {
    return Err(
      (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "admin surface disabled"})),
      )
        .into_response(),
    );
  };
  let provided = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "));
  if provided == Some(expected) {
    Ok(())
  } else {
    Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response())
  }
}

#[derive(Debug, Serialize)]
struct WindowStats {
  inboxes_created: i64,
  emails_received: i64,
  blocked_attempts: i64,
}

async fn window_stats(state: &AppState, window: Duration) -> Result<WindowStats, sqlx::Error> {
  let cutoff = Utc::now() - window;
  let inboxes_created = sqlx::query_scalar("SELECT COUNT(*) FROM inboxes WHERE created_at > ?")
    .bind(cutoff)
    .fetch_one(&state.db)
    .await?;
  let emails_received = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE received_at > ?")
    .bind(cutoff)
    .fetch_one(&state.db)
    .await?;
  // One ip_address event is written per blocked attempt (the fingerprint
  // twin is skipped when empty), so this counts attempts, not rows.
  let blocked_attempts = sqlx::query_scalar(
    "SELECT COUNT(*) FROM risk_events WHERE ts > ? AND entity_type = 'ip_address'",
  )
  .bind(cutoff)
  .fetch_one(&state.db)
  .await?;
  Ok(WindowStats {
    inboxes_created,
    emails_received,
    blocked_attempts,
  })
}

pub async fn stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
  if let Err(denied) = require_admin(&state, &headers) {
    return denied;
  }
  let day = window_stats(&state, Duration::hours(24)).await;
  let week = window_stats(&state, Duration::days(7)).await;
  match (day, week) {
    (Ok(last_24h), Ok(last_7d)) => {
      Json(json!({"last_24h": last_24h, "last_7d": last_7d})).into_response()
    }
    (Err(e), _) | (_, Err(e)) => {
      error!("admin stats error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

pub async fn list_blocked(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
  if let Err(denied) = require_admin(&state, &headers) {
    return denied;
  }
  let rows: Result<Vec<BlockedEntity>, _> = sqlx::query_as(
    "SELECT id, entity_type, entity_value, risk_level, is_active, blocked_at, reason \
     FROM blocked_entities WHERE is_active = 1 ORDER BY blocked_at DESC",
  )
  .fetch_all(&state.db)
  .await;
  match rows {
    Ok(blocked) => Json(blocked).into_response(),
    Err(e) => {
      error!("list_blocked error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

#[derive(Debug, Serialize, FromRow)]
struct OffenderRow {
  entity_value: String,
  blocked_attempts: i64,
}

async fn offenders_for(
  state: &AppState,
  entity_type: &str,
) -> Result<Vec<OffenderRow>, sqlx::Error> {
  let cutoff = Utc::now() - Duration::days(7);
  sqlx::query_as(
    "SELECT entity_value, COUNT(*) AS blocked_attempts FROM risk_events \
     WHERE ts > ? AND entity_type = ? \
     GROUP BY entity_value ORDER BY blocked_attempts DESC, entity_value ASC LIMIT 10",
  )
  .bind(cutoff)
  .bind(entity_type)
  .fetch_all(&state.db)
  .await
}

/// Top ten repeat offenders per identity kind over the trailing week.
pub async fn top_offenders(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
  if let Err(denied) = require_admin(&state, &headers) {
    return denied;
  }
  let fingerprints = offenders_for(&state, "fingerprint").await;
  let user_ids = offenders_for(&state, "user_id").await;
  let ip_addresses = offenders_for(&state, "ip_address").await;
  match (fingerprints, user_ids, ip_addresses) {
    (Ok(fingerprints), Ok(user_ids), Ok(ip_addresses)) => Json(json!({
      "fingerprints": fingerprints,
      "user_ids": user_ids,
      "ip_addresses": ip_addresses,
    }))
    .into_response(),
    _ => (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response(),
  }
}

/// Closed set of blocklist operations; no string-dispatched procedures.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AdminCommand {
  Block {
    entity_type: EntityType,
    value: String,
    #[serde(default)]
    reason: Option<String>,
  },
  Unblock {
    entity_type: EntityType,
    value: String,
  },
}

pub async fn run_command(
  State(state): State<AppState>,
  headers: HeaderMap,
  body: Json<AdminCommand>,
) -> impl IntoResponse {
  if let Err(denied) = require_admin(&state, &headers) {
    return denied;
  }
  let target = match &body.0 {
    AdminCommand::Block { value, .. } | AdminCommand::Unblock { value, .. } => value,
  };
  if target.trim().is_empty() {
    return ServiceError::Validation("entity value must not be empty".to_string()).into_response();
  }
  match body.0 {
    AdminCommand::Block {
      entity_type,
      value,
      reason,
    } => {
      let res = sqlx::query(
        "INSERT INTO blocked_entities (entity_type, entity_value, risk_level, is_active, blocked_at, reason) \
         VALUES (?, ?, 'high', 1, ?, ?) \
         ON CONFLICT(entity_type, entity_value) DO UPDATE SET \
         is_active = 1, blocked_at = excluded.blocked_at, reason = excluded.reason",
      )
      .bind(entity_type.as_str())
      .bind(&value)
      .bind(Utc::now())
      .bind(&reason)
      .execute(&state.db)
      .await;
      match res {
        Ok(_) => Json(json!({"success": true})).into_response(),
        Err(e) => {
          error!("block command error: {e}");
          (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
        }
      }
    }
    AdminCommand::Unblock { entity_type, value } => {
      let res = sqlx::query(
        "UPDATE blocked_entities SET is_active = 0 WHERE entity_type = ? AND entity_value = ?",
      )
      .bind(entity_type.as_str())
      .bind(&value)
      .execute(&state.db)
      .await;
      match res {
        Ok(done) => {
          Json(json!({"success": true, "updated": done.rows_affected()})).into_response()
        }
        Err(e) => {
          error!("unblock command error: {e}");
          (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
        }
      }
    }
  }
}
