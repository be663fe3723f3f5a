//! Sliding-window limiter for inbox creation.
//!
//! The original design leaned on store-side triggers for burst detection;
//! here it is an explicit in-process component owned by `AppState`. Keys are
//! caller-chosen (fingerprint, client IP). Memory is bounded: timestamps
//! outside the window are pruned on every check, and the key table itself is
//! capped, evicting the oldest-touched key when full.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct RateLimiterConfig {
  pub window: Duration,
  pub max_events: usize,
  pub max_keys: usize,
}

impl Default for RateLimiterConfig {
  fn default() -> Self {
    RateLimiterConfig {
      window: Duration::seconds(60),
      max_events: 5,
      max_keys: 4096,
    }
  }
}

struct KeyWindow {
  events: Vec<DateTime<Utc>>,
  last_touched: DateTime<Utc>,
}

pub struct RateLimiter {
  config: RateLimiterConfig,
  windows: Mutex<HashMap<String, KeyWindow>>,
}

impl RateLimiter {
  pub fn new(config: RateLimiterConfig) -> Self {
    RateLimiter {
      config,
      windows: Mutex::new(HashMap::new()),
    }
  }

  /// Record an event for `key` and report whether it stays within the
  /// window budget. Over-budget events are still recorded, so a client
  /// hammering the endpoint does not earn its way out of the limit.
  pub fn check(&self, key: &str, now: DateTime<Utc>) -> bool {
    let mut windows = match self.windows.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    if !windows.contains_key(key) && windows.len() >= self.config.max_keys {
      evict_oldest(&mut windows);
    }

    let entry = windows.entry(key.to_string()).or_insert_with(|| KeyWindow {
      events: Vec::new(),
      last_touched: now,
    });
    let cutoff = now - self.config.window;
    entry.events.retain(|t| *t > cutoff);
    entry.events.push(now);
    entry.last_touched = now;
    entry.events.len() <= self.config.max_events
  }
}

fn evict_oldest(windows: &mut HashMap<String, KeyWindow>) {
  let oldest = windows
    .iter()
    .min_by_key(|(_, w)| w.last_touched)
    .map(|(k, _)| k.clone());
  if let Some(key) = oldest {
    windows.remove(&key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn limiter(max_events: usize, max_keys: usize) -> RateLimiter {
    RateLimiter::new(RateLimiterConfig {
      window: Duration::seconds(60),
      max_events,
      max_keys,
    })
  }

  #[test]
  fn allows_up_to_budget_then_blocks() {
    let rl = limiter(3, 16);
    let now = Utc::now();
    assert!(rl.check("fp-1", now));
    assert!(rl.check("fp-1", now));
    assert!(rl.check("fp-1", now));
    assert!(!rl.check("fp-1", now));
  }

  #[test]
  fn events_age_out_of_the_window() {
    let rl = limiter(2, 16);
    let start = Utc::now();
    assert!(rl.check("fp-1", start));
    assert!(rl.check("fp-1", start));
    assert!(!rl.check("fp-1", start + Duration::seconds(1)));
    // 61s later only the most recent event is still in the window
    assert!(rl.check("fp-1", start + Duration::seconds(62)));
  }

  #[test]
  fn keys_are_independent() {
    let rl = limiter(1, 16);
    let now = Utc::now();
    assert!(rl.check("fp-1", now));
    assert!(!rl.check("fp-1", now));
    assert!(rl.check("fp-2", now));
  }

  #[test]
  fn key_table_is_bounded() {
    let rl = limiter(1, 2);
    let start = Utc::now();
    assert!(rl.check("a", start));
    assert!(rl.check("b", start + Duration::seconds(1)));
    // inserting a third key evicts "a", the oldest-touched
    assert!(rl.check("c", start + Duration::seconds(2)));
    let windows = rl.windows.lock().unwrap();
    assert_eq!(windows.len(), 2);
    assert!(!windows.contains_key("a"));
  }
}
