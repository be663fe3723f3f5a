//! API representation of a received email.

use super::db_email::DbEmail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiEmail {
  pub id: Uuid,
  pub inbox_id: Uuid,
  pub sender: Option<String>,
  pub recipient: String,
  pub subject: Option<String>,
  pub body: Option<String>,
  pub html_body: Option<String>,
  pub headers: HashMap<String, String>,
  pub received_at: DateTime<Utc>,
  pub is_read: bool,
  pub size_bytes: i64,
}

impl From<DbEmail> for ApiEmail {
  fn from(d: DbEmail) -> Self {
    let headers: HashMap<String, String> = d
      .headers_json
      .as_deref()
      .and_then(|s| serde_json::from_str(s).ok())
      .unwrap_or_default();
    ApiEmail {
      id: d.id,
      inbox_id: d.inbox_id,
      sender: d.sender,
      recipient: d.recipient,
      subject: d.subject,
      body: d.body,
      html_body: d.html_body,
      headers,
      received_at: d.received_at,
      is_read: d.is_read,
      size_bytes: d.size_bytes,
    }
  }
}
