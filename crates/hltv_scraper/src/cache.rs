//! In-memory response cache keyed by request URL.
//!
//! Lazy expiry only: stale entries stay in the map until overwritten, `get`
//! just refuses to return them. One entry per team page, so no size bound.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const DEFAULT_TTL_MINUTES: i64 = 60;

/// Time source, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub url: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_clock(Duration::minutes(DEFAULT_TTL_MINUTES), Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh body for `url`, or `None` when missing or `age >= ttl`.
    pub fn get(&self, url: &str) -> Option<String> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(url)?;

        if now - entry.fetched_at >= self.ttl {
            debug!("cache stale for {}", url);
            return None;
        }
        Some(entry.body.clone())
    }

    pub fn put(&self, url: &str, body: String) {
        let entry = CacheEntry {
            url: url.to_string(),
            body,
            fetched_at: self.clock.now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.url.clone(), entry);
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
