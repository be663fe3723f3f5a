//! Database row for an inbox.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbInbox {
  pub id: Uuid,
  pub email_address: String,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub is_active: bool,
}
