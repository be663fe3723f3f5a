//! Message storage, invoked only after admission accepts a recipient.

use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use crate::{app::AppState, metrics};

/// A parsed inbound message bound for one accepted inbox.
pub struct NewEmail {
  pub inbox_id: Uuid,
  pub sender: Option<String>,
  pub recipient: String,
  pub subject: Option<String>,
  pub body: Option<String>,
  pub html_body: Option<String>,
  pub headers: std::collections::HashMap<String, String>,
  pub received_at: DateTime<Utc>,
  pub size_bytes: i64,
  pub attachments: Vec<(Option<String>, String, Vec<u8>)>,
}

/// Persist an accepted message and its attachments.
///
/// The metric bump is best-effort; a failed counter must not lose mail.
pub async fn store_message(state: &AppState, msg: NewEmail) -> Result<Uuid, sqlx::Error> {
  let id = Uuid::new_v4();
  let headers_json = if msg.headers.is_empty() {
    None
  } else {
    Some(serde_json::to_string(&msg.headers).unwrap_or_else(|_| "{}".to_string()))
  };

  sqlx::query(
    "INSERT INTO emails (id, inbox_id, sender, recipient, subject, body, html_body, \
     headers_json, received_at, is_read, size_bytes) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
  )
  .bind(id)
  .bind(msg.inbox_id)
  .bind(&msg.sender)
  .bind(&msg.recipient)
  .bind(&msg.subject)
  .bind(&msg.body)
  .bind(&msg.html_body)
  .bind(headers_json)
  .bind(msg.received_at)
  .bind(msg.size_bytes)
  .execute(&state.db)
  .await?;

  for (filename, content_type, data) in msg.attachments {
    let att_id = Uuid::new_v4();
    sqlx::query(
      "INSERT INTO attachments (id, email_id, filename, content_type, size, content) \
       VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(att_id)
    .bind(id)
    .bind(filename)
    .bind(content_type)
    .bind(data.len() as i64)
    .bind(data)
    .execute(&state.db)
    .await?;
  }

  if let Err(e) = metrics::increment(&state.db, metrics::TOTAL_EMAILS_RECEIVED, 1).await {
    error!("metric update failed after ingest: {e}");
  }
  state.email_cache.invalidate(&msg.recipient);

  Ok(id)
}
