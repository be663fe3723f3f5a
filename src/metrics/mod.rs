//! Store-backed counters and gauges.
//!
//! Increments are single-statement UPSERTs so concurrent writers (sweep
//! runs, ingestion, the admission hook) never lose updates; `set` is
//! last-write-wins on purpose, used for gauges recomputed from row counts.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::models::metric::metric_row::MetricRow;

pub const TOTAL_INBOX_REQUESTS: &str = "total_inbox_requests";
pub const TOTAL_INBOXES_GENERATED: &str = "total_inboxes_generated";
pub const TOTAL_BLOCKED_ATTEMPTS: &str = "total_blocked_attempts";
pub const TOTAL_EMAILS_RECEIVED: &str = "total_emails_received";
pub const TOTAL_ADMISSION_CHECKS: &str = "total_admission_checks";
pub const TOTAL_ADMISSION_REJECTED: &str = "total_admission_rejected";
pub const TOTAL_EXPIRED_INBOXES_CLEANED: &str = "total_expired_inboxes_cleaned";
pub const TOTAL_EXPIRED_EMAILS_DELETED: &str = "total_expired_emails_deleted";
pub const TOTAL_INBOXES_EXPIRED: &str = "total_inboxes_expired";
pub const TOTAL_EMAILS_EXPIRED: &str = "total_emails_expired";
pub const CURRENT_ACTIVE_INBOXES: &str = "current_active_inboxes";
pub const CURRENT_ACTIVE_EMAILS: &str = "current_active_emails";

/// Atomic add. The row is created on first touch.
pub async fn increment(pool: &SqlitePool, name: &str, by: i64) -> Result<(), sqlx::Error> {
  sqlx::query(
    "INSERT INTO metrics (metric_name, metric_value, updated_at) VALUES (?, ?, ?) \
     ON CONFLICT(metric_name) DO UPDATE SET \
     metric_value = metric_value + excluded.metric_value, updated_at = excluded.updated_at",
  )
  .bind(name)
  .bind(by)
  .bind(Utc::now())
  .execute(pool)
  .await?;
  Ok(())
}

/// Absolute write, last-write-wins.
pub async fn set(pool: &SqlitePool, name: &str, value: i64) -> Result<(), sqlx::Error> {
  sqlx::query(
    "INSERT INTO metrics (metric_name, metric_value, updated_at) VALUES (?, ?, ?) \
     ON CONFLICT(metric_name) DO UPDATE SET \
     metric_value = excluded.metric_value, updated_at = excluded.updated_at",
  )
  .bind(name)
  .bind(value)
  .bind(Utc::now())
  .execute(pool)
  .await?;
  Ok(())
}

pub async fn get_all(pool: &SqlitePool) -> Result<HashMap<String, MetricRow>, sqlx::Error> {
  let rows: Vec<MetricRow> =
    sqlx::query_as("SELECT metric_name, metric_value, updated_at FROM metrics")
      .fetch_all(pool)
      .await?;
  Ok(rows.into_iter().map(|r| (r.metric_name.clone(), r)).collect())
}

/// Ratios derived from the counters, formatted for the metrics endpoint.
#[derive(Debug, Serialize)]
pub struct DerivedRates {
  pub bounce_rate: String,
  pub block_rate: String,
  pub expiry_rate: String,
}

pub fn derive_rates(counters: &HashMap<String, MetricRow>) -> DerivedRates {
  let value = |name: &str| counters.get(name).map(|r| r.metric_value).unwrap_or(0);
  DerivedRates {
    bounce_rate: ratio(value(TOTAL_ADMISSION_REJECTED), value(TOTAL_ADMISSION_CHECKS)),
    block_rate: ratio(value(TOTAL_BLOCKED_ATTEMPTS), value(TOTAL_INBOX_REQUESTS)),
    expiry_rate: ratio(value(TOTAL_INBOXES_EXPIRED), value(TOTAL_INBOXES_GENERATED)),
  }
}

fn ratio(numerator: i64, denominator: i64) -> String {
  if denominator <= 0 {
    return "0%".to_string();
  }
  format!("{:.1}%", numerator as f64 * 100.0 / denominator as f64)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db;
  use sqlx::sqlite::SqlitePoolOptions;

  async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .expect("connect memory sqlite");
    db::run_migrations(&pool).await.expect("migrate");
    pool
  }

  #[tokio::test]
  async fn increment_creates_then_adds() {
    let pool = test_pool().await;
    increment(&pool, "x", 2).await.unwrap();
    increment(&pool, "x", 3).await.unwrap();
    let all = get_all(&pool).await.unwrap();
    assert_eq!(all["x"].metric_value, 5);
  }

  #[tokio::test]
  async fn set_overwrites() {
    let pool = test_pool().await;
    increment(&pool, "g", 10).await.unwrap();
    set(&pool, "g", 4).await.unwrap();
    let all = get_all(&pool).await.unwrap();
    assert_eq!(all["g"].metric_value, 4);
  }

  #[tokio::test]
  async fn concurrent_increments_lose_nothing() {
    let pool = test_pool().await;
    let mut handles = Vec::new();
    for _ in 0..20 {
      let pool = pool.clone();
      handles.push(tokio::spawn(async move {
        increment(&pool, "n", 1).await.unwrap();
      }));
    }
    for h in handles {
      h.await.unwrap();
    }
    let all = get_all(&pool).await.unwrap();
    assert_eq!(all["n"].metric_value, 20);
  }

  #[tokio::test]
  async fn rates_report_zero_percent_on_empty_denominator() {
    let pool = test_pool().await;
    let rates = derive_rates(&get_all(&pool).await.unwrap());
    assert_eq!(rates.bounce_rate, "0%");
    assert_eq!(rates.block_rate, "0%");
    assert_eq!(rates.expiry_rate, "0%");
  }

  #[tokio::test]
  async fn rates_use_their_counters() {
    let pool = test_pool().await;
    increment(&pool, TOTAL_ADMISSION_CHECKS, 4).await.unwrap();
    increment(&pool, TOTAL_ADMISSION_REJECTED, 1).await.unwrap();
    let rates = derive_rates(&get_all(&pool).await.unwrap());
    assert_eq!(rates.bounce_rate, "25.0%");
  }
}
