//! Bounded TTL cache for the inbox read path.
//!
//! Owned by `AppState` and injected into handlers rather than living as a
//! module global, so tests can construct it disabled. Strictly an
//! optimization: ingestion invalidates the owning inbox's entry, and stale
//! reads are bounded by the per-entry TTL.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry<V> {
  value: V,
  stored_at: DateTime<Utc>,
}

pub struct ReadCache<V> {
  ttl: Duration,
  capacity: usize,
  enabled: bool,
  entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> ReadCache<V> {
  pub fn new(ttl: Duration, capacity: usize) -> Self {
    ReadCache {
      ttl,
      capacity,
      enabled: true,
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// A cache that stores nothing; used by tests.
  pub fn disabled() -> Self {
    ReadCache {
      ttl: Duration::zero(),
      capacity: 0,
      enabled: false,
      entries: Mutex::new(HashMap::new()),
    }
  }

  pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
    if !self.enabled {
      return None;
    }
    let entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    let entry = entries.get(key)?;
    if now - entry.stored_at > self.ttl {
      return None;
    }
    Some(entry.value.clone())
  }

  pub fn put(&self, key: &str, value: V, now: DateTime<Utc>) {
    if !self.enabled {
      return;
    }
    let mut entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    if !entries.contains_key(key) && entries.len() >= self.capacity {
      // Full: drop the stalest entry to make room.
      let oldest = entries
        .iter()
        .min_by_key(|(_, e)| e.stored_at)
        .map(|(k, _)| k.clone());
      if let Some(k) = oldest {
        entries.remove(&k);
      }
    }
    entries.insert(
      key.to_string(),
      Entry {
        value,
        stored_at: now,
      },
    );
  }

  pub fn invalidate(&self, key: &str) {
    let mut entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    entries.remove(key);
  }
}
