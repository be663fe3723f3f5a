//! Listing row for the inbox read path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmailSummary {
  pub id: Uuid,
  pub sender: Option<String>,
  pub subject: Option<String>,
  pub received_at: DateTime<Utc>,
  pub is_read: bool,
  pub size_bytes: i64,
}
