//! Audit row for a blocked creation attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Serialize, FromRow)]
pub struct RiskEvent {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub entity_type: String,
    pub entity_value: String,
    pub reason: String,
    pub risk_level: String,
}
