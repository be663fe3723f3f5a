//! Pre-acceptance decision for inbound recipients.
//!
//! Invoked by the SMTP listener at RCPT time and by the relay hook over
//! HTTP, before any message body exists. Decides only; it never writes, so
//! re-validating the same recipient is idempotent. The expiry check here is
//! authoritative and does not wait for the sweeper.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::error;
use uuid::Uuid;

use crate::inbox;

pub const REASON_INVALID_ADDRESS: &str = "Invalid email address";
pub const REASON_UNAVAILABLE: &str = "Mailbox unavailable";
pub const REASON_EXPIRED: &str = "Mailbox expired";
pub const REASON_TEMP_FAIL: &str = "Unable to validate recipient";

/// Outcome handed back to the relay. Permanent rejects bounce with 550;
/// transient failures answer 451 so the sender's MTA retries instead of
/// bouncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  Accept { inbox_id: Uuid },
  Reject { reason: &'static str },
  TempFail { reason: &'static str },
}

impl Decision {
  pub fn smtp_code(&self) -> u16 {
    match self {
      Decision::Accept { .. } => 250,
      Decision::Reject { .. } => 550,
      Decision::TempFail { .. } => 451,
    }
  }
}

/// Decide whether to accept mail for `recipient`.
pub async fn admit(
  pool: &SqlitePool,
  domain: &str,
  recipient: &str,
  now: DateTime<Utc>,
) -> Decision {
  if !is_valid_address(recipient, domain) {
    return Decision::Reject {
      reason: REASON_INVALID_ADDRESS,
    };
  }

  let found = match inbox::get_inbox(pool, recipient).await {
    Ok(found) => found,
    Err(e) => {
      // Store trouble must never turn into a permanent bounce.
      error!("admission lookup failed for {recipient}: {e}");
      return Decision::TempFail {
        reason: REASON_TEMP_FAIL,
      };
    }
  };

  match found {
    None => Decision::Reject {
      reason: REASON_UNAVAILABLE,
    },
    Some(inbox) if !inbox.is_active => Decision::Reject {
      reason: REASON_UNAVAILABLE,
    },
    Some(inbox) if inbox::is_expired(&inbox, now) => Decision::Reject {
      reason: REASON_EXPIRED,
    },
    Some(inbox) => Decision::Accept { inbox_id: inbox.id },
  }
}

/// Local part must be exactly six lowercase alphanumerics and the domain
/// must match the service domain.
pub fn is_valid_address(address: &str, domain: &str) -> bool {
  let Some((local, addr_domain)) = address.split_once('@') else {
    return false;
  };
  local.len() == 6
    && local.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    && addr_domain.eq_ignore_ascii_case(domain)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{db, inbox::create_inbox};
  use chrono::Duration;
  use sqlx::sqlite::SqlitePoolOptions;

  const DOMAIN: &str = "wispmail.test";

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
  fn address_validation() {
    assert!(is_valid_address("abc123@wispmail.test", DOMAIN));
    assert!(!is_valid_address("abc12@wispmail.test", DOMAIN));
    assert!(!is_valid_address("abc1234@wispmail.test", DOMAIN));
    assert!(!is_valid_address("ABC123@wispmail.test", DOMAIN));
    assert!(!is_valid_address("ab_123@wispmail.test", DOMAIN));
    assert!(!is_valid_address("abc123@elsewhere.test", DOMAIN));
    assert!(!is_valid_address("abc123", DOMAIN));
  }

  #[tokio::test]
  async fn malformed_recipient_rejects() {
    let pool = test_pool().await;
    let d = admit(&pool, DOMAIN, "not-an-address", Utc::now()).await;
    assert_eq!(
      d,
      Decision::Reject {
        reason: REASON_INVALID_ADDRESS
      }
    );
    assert_eq!(d.smtp_code(), 550);
  }

  #[tokio::test]
  async fn unknown_mailbox_rejects() {
    let pool = test_pool().await;
    let d = admit(&pool, DOMAIN, "zzzzzz@wispmail.test", Utc::now()).await;
    assert_eq!(
      d,
      Decision::Reject {
        reason: REASON_UNAVAILABLE
      }
    );
  }

  #[tokio::test]
  async fn active_unexpired_mailbox_accepts() {
    let pool = test_pool().await;
    let now = Utc::now();
    let inbox = create_inbox(&pool, DOMAIN, now).await.unwrap();
    let d = admit(&pool, DOMAIN, &inbox.email_address, now).await;
    assert_eq!(d, Decision::Accept { inbox_id: inbox.id });
    assert_eq!(d.smtp_code(), 250);
  }

  #[tokio::test]
  async fn expired_mailbox_rejects_before_any_sweep() {
    let pool = test_pool().await;
    let now = Utc::now();
    let inbox = create_inbox(&pool, DOMAIN, now).await.unwrap();
    let later = now + Duration::seconds(601);
    let d = admit(&pool, DOMAIN, &inbox.email_address, later).await;
    assert_eq!(
      d,
      Decision::Reject {
        reason: REASON_EXPIRED
      }
    );
  }

  #[tokio::test]
  async fn decision_is_stable_across_repeat_calls() {
    let pool = test_pool().await;
    let now = Utc::now();
    let inbox = create_inbox(&pool, DOMAIN, now).await.unwrap();
    let first = admit(&pool, DOMAIN, &inbox.email_address, now).await;
    let second = admit(&pool, DOMAIN, &inbox.email_address, now).await;
    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn deactivated_mailbox_rejects_as_unavailable() {
    let pool = test_pool().await;
    let now = Utc::now();
    let inbox = create_inbox(&pool, DOMAIN, now).await.unwrap();
    sqlx::query("UPDATE inboxes SET is_active = 0 WHERE id = ?")
      .bind(inbox.id)
      .execute(&pool)
      .await
      .unwrap();
    let d = admit(&pool, DOMAIN, &inbox.email_address, now).await;
    assert_eq!(
      d,
      Decision::Reject {
        reason: REASON_UNAVAILABLE
      }
    );
  }
}
