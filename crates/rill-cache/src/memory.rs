// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process TTL store used when the cache backend is unreachable.
//!
//! Expiry is lazy on read; a periodic sweep (driven by the owning
//! [`KvCache`](crate::KvCache)) bounds memory for keys that are never
//! read again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A TTL-aware in-process key-value map with the same observable semantics
/// as the external backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
    }

    pub async fn del(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Set a TTL on an existing key. Returns false when the key is absent
    /// (or already expired), matching the backend's EXPIRE result.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                false
            }
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        }
    }

    /// Remaining TTL in seconds: -2 when the key is absent, -1 when it has
    /// no expiry, otherwise the rounded-up remainder.
    pub async fn ttl(&self, key: &str) -> i64 {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                -2
            }
            Some(entry) => match entry.expires_at {
                Some(at) => {
                    let remaining = at.saturating_duration_since(now);
                    remaining.as_secs_f64().ceil() as i64
                }
                None => -1,
            },
            None => -2,
        }
    }

    /// Increment the integer value at `key` by `delta`, creating it at zero
    /// when absent. A non-numeric existing value is reset to the delta.
    pub async fn incr_by(&self, key: &str, delta: i64) -> i64 {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.value.parse::<i64>().unwrap_or_else(|_| {
                    debug!(key, "incr_by on non-numeric value, resetting");
                    0
                })
            }
            _ => 0,
        };
        let next = current + delta;
        let expires_at = entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        next
    }

    /// Drop all expired entries. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert!(store.exists("k").await);
    }

    #[tokio::test]
    async fn get_expired_returns_none() {
        let store = MemoryStore::new();
        store.set("k", "v", Some(Duration::from_millis(10))).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.ttl("k").await, -2);
    }

    #[tokio::test]
    async fn ttl_semantics_match_backend() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("missing").await, -2);

        store.set("forever", "v", None).await;
        assert_eq!(store.ttl("forever").await, -1);

        store.set("timed", "v", Some(Duration::from_secs(30))).await;
        let ttl = store.ttl("timed").await;
        assert!((1..=30).contains(&ttl), "got ttl {ttl}");
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_false() {
        let store = MemoryStore::new();
        assert!(!store.expire("missing", Duration::from_secs(1)).await);

        store.set("k", "v", None).await;
        assert!(store.expire("k", Duration::from_secs(30)).await);
        assert!(store.ttl("k").await > 0);
    }

    #[tokio::test]
    async fn incr_by_creates_and_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by("n", 1).await, 1);
        assert_eq!(store.incr_by("n", 4).await, 5);
        assert_eq!(store.get("n").await.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn incr_by_resets_non_numeric() {
        let store = MemoryStore::new();
        store.set("n", "not a number", None).await;
        assert_eq!(store.incr_by("n", 3).await, 3);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let store = MemoryStore::new();
        store.set("stays", "v", None).await;
        store.set("goes", "v", Some(Duration::from_millis(5))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let removed = store.sweep().await;
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.exists("stays").await);
    }
}
