//! Expired-inbox garbage collection.
//!
//! Triggered by an external scheduler; safe to run on any cadence,
//! concurrently with itself and with admission/creation. Dependent emails
//! go first so a partially failed run can never strand mail under an
//! inactive inbox; deactivation is idempotent and the next run re-discovers
//! anything left behind.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;

// SQLite bind-parameter budget; id sets are chunked under it.
const IN_CHUNK: usize = 500;

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
  pub expired_found: usize,
  pub emails_deleted: u64,
  pub inboxes_deactivated: u64,
  pub active_inboxes_before: i64,
  pub active_inboxes_after: i64,
  pub emails_before: i64,
  pub emails_after: i64,
  pub failures: Vec<String>,
}

/// Run one sweep pass. Errors only when the discovery query itself fails;
/// later steps record their failures in the report and leave the rest of
/// the pass to the next scheduled run.
pub async fn run_sweep(pool: &SqlitePool, now: DateTime<Utc>) -> Result<SweepReport, sqlx::Error> {
  let mut report = SweepReport {
    active_inboxes_before: count_active_inboxes(pool).await?,
    emails_before: count_emails(pool).await?,
    ..SweepReport::default()
  };

  let expired_ids: Vec<Uuid> =
    sqlx::query_scalar("SELECT id FROM inboxes WHERE is_active = 1 AND expires_at < ?")
      .bind(now)
      .fetch_all(pool)
      .await?;
  report.expired_found = expired_ids.len();

  if expired_ids.is_empty() {
    report.active_inboxes_after = report.active_inboxes_before;
    report.emails_after = report.emails_before;
    return Ok(report);
  }
  info!("sweep: {} expired inboxes", expired_ids.len());

  let mut emails_ok = true;
  for chunk in expired_ids.chunks(IN_CHUNK) {
    match delete_owned_emails(pool, chunk).await {
      Ok(n) => report.emails_deleted += n,
      Err(e) => {
        error!("sweep email delete failed: {e}");
        report.failures.push(format!("email delete: {e}"));
        emails_ok = false;
      }
    }
  }

  // Deactivating before the owned emails are gone would orphan them, so a
  // failed delete defers deactivation to the next pass.
  if emails_ok {
    for chunk in expired_ids.chunks(IN_CHUNK) {
      match deactivate_inboxes(pool, chunk).await {
        Ok(n) => report.inboxes_deactivated += n,
        Err(e) => {
          error!("sweep deactivation failed: {e}");
          report.failures.push(format!("inbox deactivate: {e}"));
        }
      }
    }
  } else {
    report
      .failures
      .push("inbox deactivate: skipped, email delete incomplete".to_string());
  }

  if let Err(e) = update_metrics(pool, &report).await {
    error!("sweep metric update failed: {e}");
    report.failures.push(format!("metrics: {e}"));
  }

  report.active_inboxes_after = count_active_inboxes(pool).await.unwrap_or(-1);
  report.emails_after = count_emails(pool).await.unwrap_or(-1);
  Ok(report)
}

async fn delete_owned_emails(pool: &SqlitePool, inbox_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
  let placeholders = vec!["?"; inbox_ids.len()].join(", ");

  let att_sql = format!(
    "DELETE FROM attachments WHERE email_id IN \
     (SELECT id FROM emails WHERE inbox_id IN ({placeholders}))"
  );
  let mut att_query = sqlx::query(&att_sql);
  for id in inbox_ids {
    att_query = att_query.bind(id);
  }
  att_query.execute(pool).await?;

  let sql = format!("DELETE FROM emails WHERE inbox_id IN ({placeholders})");
  let mut query = sqlx::query(&sql);
  for id in inbox_ids {
    query = query.bind(id);
  }
  Ok(query.execute(pool).await?.rows_affected())
}

async fn deactivate_inboxes(pool: &SqlitePool, inbox_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
  let placeholders = vec!["?"; inbox_ids.len()].join(", ");
  let sql = format!("UPDATE inboxes SET is_active = 0 WHERE id IN ({placeholders})");
  let mut query = sqlx::query(&sql);
  for id in inbox_ids {
    query = query.bind(id);
  }
  Ok(query.execute(pool).await?.rows_affected())
}

/// Cumulative counters plus recomputed gauges. Best-effort: a failure here
/// never unwinds the delete/deactivate steps.
async fn update_metrics(pool: &SqlitePool, report: &SweepReport) -> Result<(), sqlx::Error> {
  let cleaned = report.inboxes_deactivated as i64;
  let deleted = report.emails_deleted as i64;
  if cleaned > 0 {
    metrics::increment(pool, metrics::TOTAL_EXPIRED_INBOXES_CLEANED, cleaned).await?;
    metrics::increment(pool, metrics::TOTAL_INBOXES_EXPIRED, cleaned).await?;
  }
  if deleted > 0 {
    metrics::increment(pool, metrics::TOTAL_EXPIRED_EMAILS_DELETED, deleted).await?;
    metrics::increment(pool, metrics::TOTAL_EMAILS_EXPIRED, deleted).await?;
  }
  metrics::set(pool, metrics::CURRENT_ACTIVE_INBOXES, count_active_inboxes(pool).await?).await?;
  metrics::set(pool, metrics::CURRENT_ACTIVE_EMAILS, count_emails(pool).await?).await?;
  Ok(())
}

async fn count_active_inboxes(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
  sqlx::query_scalar("SELECT COUNT(*) FROM inboxes WHERE is_active = 1")
    .fetch_one(pool)
    .await
}

async fn count_emails(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
  sqlx::query_scalar("SELECT COUNT(*) FROM emails").fetch_one(pool).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{app::AppState, db, inbox::create_inbox, ingest};
  use chrono::Duration;
  use sqlx::sqlite::SqlitePoolOptions;

  const DOMAIN: &str = "wispmail.test";

  async fn test_state() -> AppState {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .expect("connect memory sqlite");
    db::run_migrations(&pool).await.expect("migrate");
    AppState::for_tests(pool, DOMAIN)
  }

  async fn seed_email(state: &AppState, inbox_id: Uuid, recipient: &str, subject: &str) {
    ingest::store_message(
      state,
      ingest::NewEmail {
        inbox_id,
        sender: Some("peer@example.test".into()),
        recipient: recipient.to_string(),
        subject: Some(subject.to_string()),
        body: Some("hi".into()),
        html_body: None,
        headers: Default::default(),
        received_at: Utc::now(),
        size_bytes: 2,
        attachments: vec![(Some("a.txt".into()), "text/plain".into(), b"ABC".to_vec())],
      },
    )
    .await
    .expect("seed email");
  }

  #[tokio::test]
  async fn empty_run_reports_zero_work() {
    let state = test_state().await;
    let report = run_sweep(&state.db, Utc::now()).await.unwrap();
    assert_eq!(report.expired_found, 0);
    assert_eq!(report.emails_deleted, 0);
    assert!(report.failures.is_empty());
  }

  #[tokio::test]
  async fn expired_inbox_is_swept_with_its_mail() {
    let state = test_state().await;
    let now = Utc::now();
    let inbox = create_inbox(&state.db, DOMAIN, now).await.unwrap();
    for subject in ["one", "two", "three"] {
      seed_email(&state, inbox.id, &inbox.email_address, subject).await;
    }

    let later = now + Duration::seconds(601);
    let report = run_sweep(&state.db, later).await.unwrap();
    assert_eq!(report.expired_found, 1);
    assert_eq!(report.emails_deleted, 3);
    assert_eq!(report.inboxes_deactivated, 1);
    assert!(report.failures.is_empty());

    let refreshed = crate::inbox::get_inbox(&state.db, &inbox.email_address)
      .await
      .unwrap()
      .unwrap();
    assert!(!refreshed.is_active);

    let counters = metrics::get_all(&state.db).await.unwrap();
    assert_eq!(counters[metrics::TOTAL_EXPIRED_EMAILS_DELETED].metric_value, 3);
    assert_eq!(counters[metrics::TOTAL_EXPIRED_INBOXES_CLEANED].metric_value, 1);
    assert_eq!(counters[metrics::CURRENT_ACTIVE_INBOXES].metric_value, 0);
    assert_eq!(counters[metrics::CURRENT_ACTIVE_EMAILS].metric_value, 0);
  }

  #[tokio::test]
  async fn no_email_outlives_its_inbox() {
    let state = test_state().await;
    let now = Utc::now();
    let expiring = create_inbox(&state.db, DOMAIN, now).await.unwrap();
    let fresh = create_inbox(&state.db, DOMAIN, now + Duration::seconds(300))
      .await
      .unwrap();
    seed_email(&state, expiring.id, &expiring.email_address, "doomed").await;
    seed_email(&state, fresh.id, &fresh.email_address, "kept").await;

    run_sweep(&state.db, now + Duration::seconds(601)).await.unwrap();

    // Every surviving email belongs to an active inbox.
    let orphans: i64 = sqlx::query_scalar(
      "SELECT COUNT(*) FROM emails e JOIN inboxes i ON i.id = e.inbox_id WHERE i.is_active = 0",
    )
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(orphans, 0);

    let kept: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE inbox_id = ?")
      .bind(fresh.id)
      .fetch_one(&state.db)
      .await
      .unwrap();
    assert_eq!(kept, 1);
  }

  #[tokio::test]
  async fn second_run_is_a_no_op() {
    let state = test_state().await;
    let now = Utc::now();
    let inbox = create_inbox(&state.db, DOMAIN, now).await.unwrap();
    seed_email(&state, inbox.id, &inbox.email_address, "once").await;
    let later = now + Duration::seconds(601);

    let first = run_sweep(&state.db, later).await.unwrap();
    assert_eq!(first.inboxes_deactivated, 1);
    let snapshot = metrics::get_all(&state.db).await.unwrap();

    let second = run_sweep(&state.db, later).await.unwrap();
    assert_eq!(second.expired_found, 0);
    assert_eq!(second.emails_deleted, 0);
    assert_eq!(second.inboxes_deactivated, 0);
    assert!(second.failures.is_empty());

    let after = metrics::get_all(&state.db).await.unwrap();
    for (name, row) in snapshot {
      assert_eq!(after[&name].metric_value, row.metric_value, "metric {name} moved");
    }
  }

  #[tokio::test]
  async fn sweep_removes_attachments_of_deleted_mail() {
    let state = test_state().await;
    let now = Utc::now();
    let inbox = create_inbox(&state.db, DOMAIN, now).await.unwrap();
    seed_email(&state, inbox.id, &inbox.email_address, "with attachment").await;

    run_sweep(&state.db, now + Duration::seconds(601)).await.unwrap();

    let atts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attachments")
      .fetch_one(&state.db)
      .await
      .unwrap();
    assert_eq!(atts, 0);
  }
}
