//! API representation of an inbox.

use super::db_inbox::DbInbox;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiInbox {
  pub id: Uuid,
  pub address: String,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub is_active: bool,
}

impl From<DbInbox> for ApiInbox {
  fn from(d: DbInbox) -> Self {
    ApiInbox {
      id: d.id,
      address: d.email_address,
      created_at: d.created_at,
      expires_at: d.expires_at,
      is_active: d.is_active,
    }
  }
}
