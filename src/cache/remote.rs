//! Remote cache tier backed by Redis.
//!
//! The remote tier is strictly best-effort. Every operation runs under a
//! short deadline; a timeout or transport error marks the tier degraded and
//! reads fall back to the in-process tier until a probe succeeds again.
//! Every write carries a TTL so entries that outlive a failed invalidation
//! age out on their own.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RemoteCacheError {
    #[error("invalid redis url: {0}")]
    InvalidUrl(redis::RedisError),
    #[error("redis connection failed: {0}")]
    Connect(redis::RedisError),
}

/// Health snapshot of the remote tier, exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteHealth {
    Healthy,
    Degraded,
}

pub struct RemoteCache {
    conn: ConnectionManager,
    prefix: String,
    op_timeout: Duration,
    entry_ttl_secs: u64,
    failure_threshold: u32,
    retry_cooldown: Duration,

    degraded: AtomicBool,
    consecutive_failures: AtomicU32,
    /// Millis since `started` of the most recent degraded-mode probe.
    last_probe_ms: AtomicU64,
    started: Instant,
}

impl RemoteCache {
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        op_timeout: Duration,
        entry_ttl_secs: u64,
        failure_threshold: u32,
        retry_cooldown: Duration,
    ) -> Result<Self, RemoteCacheError> {
        let client = redis::Client::open(url).map_err(RemoteCacheError::InvalidUrl)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(RemoteCacheError::Connect)?;

        Ok(Self {
            conn,
            prefix: prefix.into(),
            op_timeout,
            entry_ttl_secs,
            failure_threshold: failure_threshold.max(1),
            retry_cooldown,
            degraded: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            last_probe_ms: AtomicU64::new(0),
            started: Instant::now(),
        })
    }

    pub fn health(&self) -> RemoteHealth {
        if self.degraded.load(Ordering::Relaxed) {
            RemoteHealth::Degraded
        } else {
            RemoteHealth::Healthy
        }
    }

    fn format_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// While degraded, only one request per cooldown window reaches Redis.
    fn may_attempt(&self) -> bool {
        if !self.degraded.load(Ordering::Relaxed) {
            return true;
        }

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let last = self.last_probe_ms.load(Ordering::Relaxed);
        if elapsed_ms.saturating_sub(last) < self.retry_cooldown.as_millis() as u64 {
            return false;
        }

        // Claim the probe slot; losers stay on the fallback tier.
        self.last_probe_ms
            .compare_exchange(last, elapsed_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("Remote cache recovered, leaving degraded mode");
            counter!("vetrina_cache_remote_recovered_total").increment(1);
        }
    }

    fn record_failure(&self, op: &'static str, detail: &str) {
        counter!("vetrina_cache_remote_failure_total").increment(1);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.failure_threshold && !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                op,
                failures, detail, "Remote cache entering degraded mode"
            );
            counter!("vetrina_cache_remote_degraded_total").increment(1);
        } else {
            debug!(op, failures, detail, "Remote cache operation failed");
        }
    }

    /// Fetch and deserialize an entry. Any failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.may_attempt() {
            return None;
        }

        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let fetch = async move {
            let value: Option<String> = conn.get(&full_key).await?;
            Ok::<_, redis::RedisError>(value)
        };

        match tokio::time::timeout(self.op_timeout, fetch).await {
            Ok(Ok(Some(data))) => {
                self.record_success();
                match serde_json::from_str(&data) {
                    Ok(value) => {
                        counter!("vetrina_cache_remote_hit_total").increment(1);
                        Some(value)
                    }
                    Err(err) => {
                        // A payload from an older build; drop it and miss.
                        warn!(key, error = %err, "Discarding undecodable remote cache entry");
                        self.delete(key).await;
                        None
                    }
                }
            }
            Ok(Ok(None)) => {
                self.record_success();
                counter!("vetrina_cache_remote_miss_total").increment(1);
                None
            }
            Ok(Err(err)) => {
                self.record_failure("get", &err.to_string());
                None
            }
            Err(_) => {
                self.record_failure("get", "deadline exceeded");
                None
            }
        }
    }

    /// Serialize and store an entry under the configured TTL. Best-effort.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        if !self.may_attempt() {
            return;
        }

        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, error = %err, "Skipping remote cache write, serialization failed");
                return;
            }
        };

        let full_key = self.format_key(key);
        let ttl = self.entry_ttl_secs;
        let mut conn = self.conn.clone();

        let store = async move {
            let _: () = conn.set_ex(&full_key, data, ttl).await?;
            Ok::<_, redis::RedisError>(())
        };

        match tokio::time::timeout(self.op_timeout, store).await {
            Ok(Ok(())) => self.record_success(),
            Ok(Err(err)) => self.record_failure("set", &err.to_string()),
            Err(_) => self.record_failure("set", "deadline exceeded"),
        }
    }

    /// Delete an entry. Always attempted, even in degraded mode; a missed
    /// delete only means the entry lives until its TTL.
    pub async fn delete(&self, key: &str) {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let remove = async move {
            let _: u64 = conn.del(&full_key).await?;
            Ok::<_, redis::RedisError>(())
        };

        match tokio::time::timeout(self.op_timeout, remove).await {
            Ok(Ok(())) => self.record_success(),
            Ok(Err(err)) => self.record_failure("delete", &err.to_string()),
            Err(_) => self.record_failure("delete", "deadline exceeded"),
        }
    }

    /// Delete every entry under a key prefix via SCAN. Always attempted,
    /// like `delete`; entries a failed pass leaves behind live until their
    /// TTL.
    pub async fn delete_prefix(&self, prefix: &str) {
        let pattern = format!("{}{}*", self.prefix, prefix);
        let mut conn = self.conn.clone();

        let remove = async move {
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await?;
                if !keys.is_empty() {
                    let _: u64 = conn.del(&keys).await?;
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok::<_, redis::RedisError>(())
        };

        match tokio::time::timeout(self.op_timeout, remove).await {
            Ok(Ok(())) => self.record_success(),
            Ok(Err(err)) => self.record_failure("delete_prefix", &err.to_string()),
            Err(_) => self.record_failure("delete_prefix", "deadline exceeded"),
        }
    }

    /// PING the backend, for health reporting.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let probe = async move {
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(pong)
        };

        match tokio::time::timeout(self.op_timeout, probe).await {
            Ok(Ok(_)) => {
                self.record_success();
                true
            }
            Ok(Err(err)) => {
                self.record_failure("ping", &err.to_string());
                false
            }
            Err(_) => {
                self.record_failure("ping", "deadline exceeded");
                false
            }
        }
    }
}
