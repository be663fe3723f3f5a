//! Inbox creation and read APIs.

use crate::{
  app::AppState,
  error::ServiceError,
  inbox, metrics,
  models::{
    attachment::attachment_meta::AttachmentMeta,
    email::{api_email::ApiEmail, db_email::DbEmail, email_summary::EmailSummary},
    inbox::api_inbox::ApiInbox,
    response::message_with_attachments::MessageWithAttachments,
  },
  risk,
};
use axum::{
  Json,
  extract::{Path as AxumPath, State},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

/// Client-reported screening metadata; everything is optional so a bare
/// POST still gets a (blocking) answer from the fingerprint rule.
#[derive(Debug, Default, Deserialize)]
pub struct CreateInboxRequest {
  #[serde(default)]
  pub fingerprint: Option<String>,
  #[serde(default)]
  pub seconds_since_last: Option<f64>,
}

pub async fn create_inbox(
  State(state): State<AppState>,
  headers: HeaderMap,
  body: Option<Json<CreateInboxRequest>>,
) -> impl IntoResponse {
  let req = body.map(|Json(r)| r).unwrap_or_default();
  let fingerprint = req.fingerprint.unwrap_or_default();
  let user_agent = headers
    .get(header::USER_AGENT)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();
  let client_ip = headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(|v| v.trim().to_string())
    .unwrap_or_else(|| "unknown".to_string());

  if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_INBOX_REQUESTS, 1).await {
    error!("metric update failed: {e}");
  }

  match screened_create(&state, user_agent, &fingerprint, req.seconds_since_last, &client_ip).await
  {
    Ok(created) => {
      if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_INBOXES_GENERATED, 1).await {
        error!("metric update failed: {e}");
      }
      (StatusCode::CREATED, Json(ApiInbox::from(created))).into_response()
    }
    Err(e) => e.into_response(),
  }
}

/// Screening pipeline ahead of persistence: heuristic, blocklist, then
/// rate limits. Every block leaves a risk-event audit row.
async fn screened_create(
  state: &AppState,
  user_agent: &str,
  fingerprint: &str,
  seconds_since_last: Option<f64>,
  client_ip: &str,
) -> Result<crate::models::inbox::db_inbox::DbInbox, ServiceError> {
  let assessment = risk::evaluate(user_agent, seconds_since_last, fingerprint);
  if assessment.should_block {
    warn!(
      "creation blocked ({}) fp={} ip={}",
      assessment.reason, fingerprint, client_ip
    );
    record_block(state, fingerprint, client_ip, &assessment).await;
    return Err(ServiceError::RiskBlocked {
      reason: assessment.reason,
      risk_level: assessment.risk_level,
    });
  }

  if is_blocklisted(state, fingerprint, client_ip).await? {
    record_block_reason(state, fingerprint, client_ip, "blocklisted entity", "high").await;
    return Err(ServiceError::RiskBlocked {
      reason: "blocklisted entity".to_string(),
      risk_level: risk::RiskLevel::High,
    });
  }

  let now = Utc::now();
  let fp_ok = state.fingerprint_limiter.check(fingerprint, now);
  let ip_ok = state.ip_limiter.check(client_ip, now);
  if !fp_ok || !ip_ok {
    record_block_reason(state, fingerprint, client_ip, "rate limit exceeded", "medium").await;
    return Err(ServiceError::RateLimited {
      key: fingerprint.to_string(),
    });
  }

  Ok(inbox::create_inbox(&state.db, &state.domain, now).await?)
}

pub async fn get_inbox(
  State(state): State<AppState>,
  AxumPath(address): AxumPath<String>,
) -> impl IntoResponse {
  match inbox::get_inbox(&state.db, &address).await {
    Ok(Some(found)) => Json(ApiInbox::from(found)).into_response(),
    Ok(None) => (StatusCode::NOT_FOUND, "inbox not found").into_response(),
    Err(e) => {
      error!("get_inbox error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

pub async fn list_emails(
  State(state): State<AppState>,
  AxumPath(address): AxumPath<String>,
) -> impl IntoResponse {
  let found = match inbox::get_inbox(&state.db, &address).await {
    Ok(found) => found,
    Err(e) => {
      error!("list_emails inbox lookup error: {e}");
      return (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response();
    }
  };
  let Some(owner) = found else {
    return (StatusCode::NOT_FOUND, "inbox not found").into_response();
  };

  let now = Utc::now();
  if let Some(cached) = state.email_cache.get(&address, now) {
    return Json(cached).into_response();
  }

  let rows: Result<Vec<EmailSummary>, _> = sqlx::query_as(
    "SELECT id, sender, subject, received_at, is_read, size_bytes FROM emails \
     WHERE inbox_id = ? ORDER BY received_at DESC",
  )
  .bind(owner.id)
  .fetch_all(&state.db)
  .await;
  match rows {
    Ok(summaries) => {
      state.email_cache.put(&address, summaries.clone(), now);
      Json(summaries).into_response()
    }
    Err(e) => {
      error!("list_emails error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

pub async fn get_email(
  State(state): State<AppState>,
  AxumPath((address, id)): AxumPath<(String, Uuid)>,
) -> impl IntoResponse {
  let owner = match inbox::get_inbox(&state.db, &address).await {
    Ok(Some(owner)) => owner,
    Ok(None) => return (StatusCode::NOT_FOUND, "inbox not found").into_response(),
    Err(e) => {
      error!("get_email inbox lookup error: {e}");
      return (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response();
    }
  };

  // Opening a message marks it read.
  if let Err(e) = sqlx::query("UPDATE emails SET is_read = 1 WHERE id = ? AND inbox_id = ?")
    .bind(id)
    .bind(owner.id)
    .execute(&state.db)
    .await
  {
    error!("get_email mark-read error: {e}");
  }

  let row: Result<Option<DbEmail>, _> = sqlx::query_as(
    "SELECT id, inbox_id, sender, recipient, subject, body, html_body, headers_json, \
     received_at, is_read, size_bytes FROM emails WHERE id = ? AND inbox_id = ?",
  )
  .bind(id)
  .bind(owner.id)
  .fetch_optional(&state.db)
  .await;
  match row {
    Ok(Some(m)) => {
      let attachments: Vec<AttachmentMeta> = sqlx::query_as(
        "SELECT id, email_id, filename, content_type, size FROM attachments \
         WHERE email_id = ? ORDER BY rowid",
      )
      .bind(id)
      .fetch_all(&state.db)
      .await
      .unwrap_or_default();
      Json(MessageWithAttachments {
        message: ApiEmail::from(m),
        attachments,
      })
      .into_response()
    }
    Ok(None) => (StatusCode::NOT_FOUND, "message not found").into_response(),
    Err(e) => {
      error!("get_email error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}

async fn is_blocklisted(
  state: &AppState,
  fingerprint: &str,
  client_ip: &str,
) -> Result<bool, sqlx::Error> {
  let hits: i64 = sqlx::query_scalar(
    "SELECT COUNT(*) FROM blocked_entities WHERE is_active = 1 AND \
     ((entity_type = 'fingerprint' AND entity_value = ?) OR \
      (entity_type = 'ip_address' AND entity_value = ?))",
  )
  .bind(fingerprint)
  .bind(client_ip)
  .fetch_one(&state.db)
  .await?;
  Ok(hits > 0)
}

async fn record_block(
  state: &AppState,
  fingerprint: &str,
  client_ip: &str,
  assessment: &risk::RiskAssessment,
) {
  let level = match assessment.risk_level {
    risk::RiskLevel::Low => "low",
    risk::RiskLevel::Medium => "medium",
    risk::RiskLevel::High => "high",
    risk::RiskLevel::Critical => "critical",
  };
  record_block_reason(state, fingerprint, client_ip, &assessment.reason, level).await;
}

/// Audit one blocked attempt under both identities and bump the counter.
async fn record_block_reason(
  state: &AppState,
  fingerprint: &str,
  client_ip: &str,
  reason: &str,
  risk_level: &str,
) {
  let now = Utc::now();
  for (entity_type, entity_value) in [("fingerprint", fingerprint), ("ip_address", client_ip)] {
    if entity_value.is_empty() {
      continue;
    }
    if let Err(e) = sqlx::query(
      "INSERT INTO risk_events (ts, entity_type, entity_value, reason, risk_level) \
       VALUES (?, ?, ?, ?, ?)",
    )
    .bind(now)
    .bind(entity_type)
    .bind(entity_value)
    .bind(reason)
    .bind(risk_level)
    .execute(&state.db)
    .await
    {
      error!("risk event insert failed: {e}");
    }
  }
  if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_BLOCKED_ATTEMPTS, 1).await {
    error!("metric update failed: {e}");
  }
}
