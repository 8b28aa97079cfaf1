// SPDX-FileCopyrightText: 2026 Rill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value cache abstraction with transparent fallback.
//!
//! [`KvCache`] offers a uniform get/set/expire/incr contract over an
//! external redis backend. When the backend is unreachable (connect
//! failure, or an operation failing after limited retries) it switches
//! silently to an in-process store with the same TTL semantics, logging
//! once per transition, and probes opportunistically to switch back.
//! Callers never branch on backend health: the whole API is infallible.

mod memory;

pub use memory::MemoryStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, RedisResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rill_config::CacheConfig;

/// Uniform key-value cache over redis with an in-process fallback store.
pub struct KvCache {
    client: Option<Client>,
    conn: Mutex<Option<ConnectionManager>>,
    /// True while operations are served by the in-process store.
    degraded: AtomicBool,
    last_probe: Mutex<Instant>,
    memory: MemoryStore,
    config: CacheConfig,
}

impl KvCache {
    /// Create a cache bound to the configured backend URL.
    ///
    /// No connection is made here; the first operation establishes one. A
    /// malformed URL is logged and the cache runs on the in-process store.
    pub fn new(config: CacheConfig) -> Self {
        let client = match &config.url {
            Some(url) => match Client::open(url.as_str()) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "invalid cache backend url, using in-process store only");
                    None
                }
            },
            None => None,
        };
        let degraded = client.is_none();
        Self {
            client,
            conn: Mutex::new(None),
            degraded: AtomicBool::new(degraded),
            // Allow an immediate first probe.
            last_probe: Mutex::new(Instant::now() - Duration::from_secs(3600)),
            memory: MemoryStore::new(),
            config,
        }
    }

    /// Create a cache with no external backend at all.
    pub fn in_memory() -> Self {
        Self::new(CacheConfig {
            url: None,
            ..CacheConfig::default()
        })
    }

    /// Whether operations are currently served by the in-process store.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        match self.try_backend::<Option<String>>(&cmd).await {
            Some(value) => value,
            None => self.memory.get(key).await,
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        if self.try_backend::<()>(&cmd).await.is_none() {
            self.memory.set(key, value, ttl).await;
        }
    }

    pub async fn del(&self, key: &str) {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        if self.try_backend::<i64>(&cmd).await.is_none() {
            self.memory.del(key).await;
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        match self.try_backend::<i64>(&cmd).await {
            Some(n) => n > 0,
            None => self.memory.exists(key).await,
        }
    }

    /// Set a TTL on an existing key. Returns false when the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl.as_secs().max(1));
        match self.try_backend::<i64>(&cmd).await {
            Some(n) => n == 1,
            None => self.memory.expire(key, ttl).await,
        }
    }

    /// Remaining TTL in seconds: -2 absent, -1 no expiry, otherwise seconds.
    pub async fn ttl(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        match self.try_backend::<i64>(&cmd).await {
            Some(n) => n,
            None => self.memory.ttl(key).await,
        }
    }

    pub async fn incr(&self, key: &str) -> i64 {
        self.incr_by(key, 1).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> i64 {
        let mut cmd = redis::cmd("INCRBY");
        cmd.arg(key).arg(delta);
        match self.try_backend::<i64>(&cmd).await {
            Some(n) => n,
            None => self.memory.incr_by(key, delta).await,
        }
    }

    /// Spawn the periodic expiry sweep for the in-process store, bounded by
    /// `cancel`.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = Duration::from_secs(cache.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = cache.memory.sweep().await;
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                    _ = cancel.cancelled() => {
                        debug!("cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Run `cmd` against the backend with bounded retries.
    ///
    /// `None` means the backend is unavailable and the caller must serve the
    /// operation from the in-process store. Backend errors are absorbed here,
    /// never returned.
    async fn try_backend<T: FromRedisValue>(&self, cmd: &Cmd) -> Option<T> {
        let mut conn = self.backend_connection().await?;
        let op_timeout = Duration::from_millis(self.config.op_timeout_ms.max(1));
        let attempts = self.config.retry_attempts.max(1);

        for attempt in 1..=attempts {
            let result: Result<RedisResult<T>, _> =
                tokio::time::timeout(op_timeout, cmd.query_async(&mut conn)).await;
            match result {
                Ok(Ok(value)) => {
                    self.mark_recovered();
                    return Some(value);
                }
                Ok(Err(e)) => {
                    debug!(error = %e, attempt, "cache backend operation failed");
                }
                Err(_) => {
                    debug!(attempt, timeout_ms = self.config.op_timeout_ms, "cache backend operation timed out");
                }
            }
        }

        self.mark_degraded().await;
        None
    }

    /// Current backend connection, establishing or re-establishing one when
    /// allowed by the probe interval.
    async fn backend_connection(&self) -> Option<ConnectionManager> {
        let client = self.client.as_ref()?;

        let mut conn = self.conn.lock().await;
        if let Some(existing) = conn.as_ref() {
            return Some(existing.clone());
        }

        // Re-establishment is rate-limited so a dead backend does not add a
        // connect timeout to every operation.
        {
            let mut last_probe = self.last_probe.lock().await;
            let probe_interval = Duration::from_secs(self.config.probe_interval_secs);
            if self.is_degraded() && last_probe.elapsed() < probe_interval {
                return None;
            }
            *last_probe = Instant::now();
        }

        let connect_timeout = Duration::from_millis(self.config.op_timeout_ms.max(1));
        match tokio::time::timeout(connect_timeout, client.get_connection_manager()).await {
            Ok(Ok(manager)) => {
                *conn = Some(manager.clone());
                self.mark_recovered();
                Some(manager)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "cache backend connect failed");
                self.mark_degraded().await;
                None
            }
            Err(_) => {
                debug!("cache backend connect timed out");
                self.mark_degraded().await;
                None
            }
        }
    }

    async fn mark_degraded(&self) {
        self.conn.lock().await.take();
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!("cache backend unreachable, falling back to in-process store");
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("cache backend reachable again, leaving in-process fallback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> CacheConfig {
        CacheConfig {
            // Reserved port; connects are refused immediately.
            url: Some("redis://127.0.0.1:1/".to_string()),
            op_timeout_ms: 50,
            retry_attempts: 1,
            probe_interval_secs: 60,
            sweep_interval_secs: 60,
        }
    }

    #[tokio::test]
    async fn in_memory_put_get_expire_sequence() {
        let cache = KvCache::in_memory();
        cache.set("k", "v", None).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert!(cache.exists("k").await);
        assert_eq!(cache.ttl("k").await, -1);

        assert!(cache.expire("k", Duration::from_secs(30)).await);
        assert!(cache.ttl("k").await > 0);

        cache.del("k").await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.ttl("k").await, -2);
    }

    #[tokio::test]
    async fn unreachable_backend_behaves_like_memory() {
        // Same return values and semantics as the reachable path, with the
        // degradation fully absorbed.
        let cache = KvCache::new(unreachable_config());

        cache.set("k", "v", None).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert!(cache.expire("k", Duration::from_secs(30)).await);
        assert!(cache.ttl("k").await > 0);
        assert!(cache.is_degraded());
    }

    #[tokio::test]
    async fn incr_works_degraded() {
        let cache = KvCache::new(unreachable_config());
        assert_eq!(cache.incr("hits").await, 1);
        assert_eq!(cache.incr_by("hits", 9).await, 10);
    }

    #[tokio::test]
    async fn malformed_url_falls_back_silently() {
        let cache = KvCache::new(CacheConfig {
            url: Some("not a url".to_string()),
            ..CacheConfig::default()
        });
        assert!(cache.is_degraded());
        cache.set("k", "v", None).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn probe_is_rate_limited_while_degraded() {
        let cache = KvCache::new(unreachable_config());
        // First op pays the connect attempt and flips to degraded.
        cache.set("a", "1", None).await;
        assert!(cache.is_degraded());

        // Subsequent ops inside the probe interval must not stall on the
        // backend again.
        let started = Instant::now();
        for _ in 0..10 {
            cache.get("a").await;
        }
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn sweeper_can_be_cancelled() {
        let cache = Arc::new(KvCache::in_memory());
        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
