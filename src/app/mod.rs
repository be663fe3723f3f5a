//! Application setup and runtime.

use crate::models::email::email_summary::EmailSummary;
use crate::{cache::ReadCache, db, http, ratelimit, smtp};
use chrono::Duration;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

// Open-question decision: creation burst control is an in-process sliding
// window, 5/min per fingerprint and 15/min per client IP.
const FINGERPRINT_LIMIT_PER_MIN: usize = 5;
const IP_LIMIT_PER_MIN: usize = 15;

const EMAIL_CACHE_TTL_SECS: i64 = 2;
const EMAIL_CACHE_CAPACITY: usize = 256;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
  pub db: SqlitePool,
  pub domain: String,
  pub admin_token: Option<String>,
  pub fingerprint_limiter: Arc<ratelimit::RateLimiter>,
  pub ip_limiter: Arc<ratelimit::RateLimiter>,
  pub email_cache: Arc<ReadCache<Vec<EmailSummary>>>,
}

impl AppState {
  pub fn new(db: SqlitePool, domain: String, admin_token: Option<String>) -> Self {
    AppState {
      db,
      domain,
      admin_token,
      fingerprint_limiter: Arc::new(ratelimit::RateLimiter::new(ratelimit::RateLimiterConfig {
        max_events: FINGERPRINT_LIMIT_PER_MIN,
        ..Default::default()
      })),
      ip_limiter: Arc::new(ratelimit::RateLimiter::new(ratelimit::RateLimiterConfig {
        max_events: IP_LIMIT_PER_MIN,
        ..Default::default()
      })),
      email_cache: Arc::new(ReadCache::new(
        Duration::seconds(EMAIL_CACHE_TTL_SECS),
        EMAIL_CACHE_CAPACITY,
      )),
    }
  }

  /// State with the read cache disabled, for tests that assert on fresh
  /// store contents.
  pub fn for_tests(db: SqlitePool, domain: &str) -> Self {
    AppState {
      email_cache: Arc::new(ReadCache::disabled()),
      ..AppState::new(db, domain.to_string(), Some("test-admin-token".to_string()))
    }
  }
}

/// Start HTTP and SMTP servers with configured environment.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  crate::util::init_tracing();

  let db_url =
    std::env::var("WISPMAIL_DATABASE").unwrap_or_else(|_| "sqlite://wispmail.db".to_string());
  let db_url = db::ensure_sqlite_path(&db_url);
  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(&db_url)
    .await?;
  db::run_migrations(&pool).await?;

  let domain = std::env::var("WISPMAIL_DOMAIN").unwrap_or_else(|_| "wispmail.test".to_string());
  let admin_token = std::env::var("WISPMAIL_ADMIN_TOKEN").ok();
  if admin_token.is_none() {
    info!("WISPMAIL_ADMIN_TOKEN unset; admin surface disabled");
  }
  let state = AppState::new(pool, domain, admin_token);

  let app = http::build_router(state.clone());

  let addr: SocketAddr = std::env::var("WISPMAIL_ADDR")
    .unwrap_or_else(|_| "127.0.0.1:8030".to_string())
    .parse()?;

  info!("inbox API:        POST http://{}/inboxes", addr);
  info!("admission hook:   POST http://{}/mail/admission", addr);
  info!("sweep trigger:    POST http://{}/maintenance/sweep", addr);

  // Start SMTP listener in background
  let smtp_state = state.clone();
  tokio::spawn(async move {
    if let Err(e) = smtp::start_smtp(smtp_state).await {
      error!("smtp listener error: {e}");
    }
  });

  // Start HTTP server
  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;
  Ok(())
}
