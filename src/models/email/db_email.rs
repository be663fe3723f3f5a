//! Database row for a received email.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct DbEmail {
    pub id: Uuid,
    pub inbox_id: Uuid,
    pub sender: Option<String>,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub html_body: Option<String>,
    pub headers_json: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    pub size_bytes: i64,
}
