//! Counter row stored in SQLite and exposed via API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MetricRow {
    pub metric_name: String,
    pub metric_value: i64,
    pub updated_at: DateTime<Utc>,
}
