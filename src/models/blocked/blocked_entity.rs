//! Blocked-entity row managed by the admin surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kinds of entity a block can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
  UserId,
  Fingerprint,
  IpAddress,
}

impl EntityType {
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityType::UserId => "user_id",
      EntityType::Fingerprint => "fingerprint",
      EntityType::IpAddress => "ip_address",
    }
  }
}

#[derive(Debug, Serialize, FromRow)]
pub struct BlockedEntity {
  pub id: i64,
  pub entity_type: String,
  pub entity_value: String,
  pub risk_level: String,
  pub is_active: bool,
  pub blocked_at: DateTime<Utc>,
  pub reason: Option<String>,
}
