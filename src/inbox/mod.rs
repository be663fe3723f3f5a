//! Inbox lifecycle: creation, lookup, expiry.
//!
//! An inbox is ACTIVE from creation until the sweeper marks it INACTIVE
//! after its fixed TTL has passed; there are no other transitions.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::models::inbox::db_inbox::DbInbox;

/// Fixed inbox lifetime.
pub const INBOX_TTL_SECS: i64 = 600;

const LOCAL_PART_LEN: usize = 6;
const CREATE_ATTEMPTS: usize = 3;

/// Create a new inbox with a random address under `domain`.
///
/// The 36^6 address space makes collisions rare but not impossible; a
/// uniqueness violation is retried with a fresh local part, bounded at
/// three attempts.
pub async fn create_inbox(
  pool: &SqlitePool,
  domain: &str,
  now: DateTime<Utc>,
) -> Result<DbInbox, sqlx::Error> {
  let mut last_err = None;
  for attempt in 0..CREATE_ATTEMPTS {
    let inbox = DbInbox {
      id: Uuid::new_v4(),
      email_address: format!("{}@{}", random_local_part(), domain),
      created_at: now,
      expires_at: now + Duration::seconds(INBOX_TTL_SECS),
      is_active: true,
    };
    let res = sqlx::query(
      "INSERT INTO inboxes (id, email_address, created_at, expires_at, is_active) \
       VALUES (?, ?, ?, ?, ?)",
    )
    .bind(inbox.id)
    .bind(&inbox.email_address)
    .bind(inbox.created_at)
    .bind(inbox.expires_at)
    .bind(inbox.is_active)
    .execute(pool)
    .await;
    match res {
      Ok(_) => return Ok(inbox),
      Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
        warn!(
          "address collision on attempt {}/{}, regenerating",
          attempt + 1,
          CREATE_ATTEMPTS
        );
        last_err = Some(sqlx::Error::Database(db_err));
      }
      Err(e) => return Err(e),
    }
  }
  Err(last_err.unwrap_or(sqlx::Error::RowNotFound))
}

/// Look up an inbox by its full address.
pub async fn get_inbox(
  pool: &SqlitePool,
  email_address: &str,
) -> Result<Option<DbInbox>, sqlx::Error> {
  sqlx::query_as(
    "SELECT id, email_address, created_at, expires_at, is_active \
     FROM inboxes WHERE email_address = ?",
  )
  .bind(email_address)
  .fetch_optional(pool)
  .await
}

pub fn is_expired(inbox: &DbInbox, now: DateTime<Utc>) -> bool {
  now > inbox.expires_at
}

fn random_local_part() -> String {
  const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
  let mut rng = rand::thread_rng();
  (0..LOCAL_PART_LEN)
    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
    .collect()
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

  #[test]
  fn local_part_shape() {
    for _ in 0..50 {
      let lp = random_local_part();
      assert_eq!(lp.len(), 6);
      assert!(lp.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
  }

  #[tokio::test]
  async fn created_inbox_has_exact_ttl() {
    let pool = test_pool().await;
    let now = Utc::now();
    let inbox = create_inbox(&pool, "wispmail.test", now).await.unwrap();
    assert_eq!(inbox.expires_at - inbox.created_at, Duration::seconds(600));
    assert!(inbox.is_active);
    assert!(inbox.email_address.ends_with("@wispmail.test"));
  }

  #[tokio::test]
  async fn created_inbox_is_retrievable() {
    let pool = test_pool().await;
    let now = Utc::now();
    let inbox = create_inbox(&pool, "wispmail.test", now).await.unwrap();
    let found = get_inbox(&pool, &inbox.email_address).await.unwrap().unwrap();
    assert_eq!(found.id, inbox.id);
    assert_eq!(found.expires_at, inbox.expires_at);
  }

  #[tokio::test]
  async fn unknown_address_is_none() {
    let pool = test_pool().await;
    let found = get_inbox(&pool, "zzzzzz@wispmail.test").await.unwrap();
    assert!(found.is_none());
  }

  #[test]
  fn expiry_boundary_is_exclusive() {
    let now = Utc::now();
    let inbox = DbInbox {
      id: Uuid::new_v4(),
      email_address: "abc123@wispmail.test".into(),
      created_at: now,
      expires_at: now + Duration::seconds(600),
      is_active: true,
    };
    assert!(!is_expired(&inbox, now + Duration::seconds(600)));
    assert!(is_expired(&inbox, now + Duration::seconds(601)));
  }
}
