//! Cache configuration.
//!
//! Controls the object cache, the response cache and the remote tier via
//! `vetrina.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_ARTICLE_LIMIT: usize = 500;
const DEFAULT_PROJECT_LIMIT: usize = 200;
const DEFAULT_LIST_LIMIT: usize = 50;
const DEFAULT_VIEW_COUNT_LIMIT: usize = 1000;
const DEFAULT_RESPONSE_LIMIT: usize = 200;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_REMOTE_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_REMOTE_ENTRY_TTL_SECS: u64 = 300;
const DEFAULT_REMOTE_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_REMOTE_RETRY_COOLDOWN_MS: u64 = 10_000;

/// Cache configuration from `vetrina.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the object/query cache.
    pub enable_object_cache: bool,
    /// Enable the response cache.
    pub enable_response_cache: bool,
    /// Maximum articles in each in-process KV cache.
    pub article_limit: usize,
    /// Maximum projects in the in-process KV cache.
    pub project_limit: usize,
    /// Maximum list pages in each in-process list cache.
    pub list_limit: usize,
    /// Maximum view counters in the in-process cache.
    pub view_count_limit: usize,
    /// Maximum HTTP responses in the in-process response cache.
    pub response_limit: usize,
    /// Auto-consume interval (ms) for eventual consistency.
    pub auto_consume_interval_ms: u64,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
    /// Per-operation deadline for the remote tier (ms).
    pub remote_op_timeout_ms: u64,
    /// TTL applied to every remote entry (secs). Keeps entries that survive
    /// a failed invalidation from staying stale forever.
    pub remote_entry_ttl_secs: u64,
    /// Consecutive remote failures before the tier is marked degraded.
    pub remote_failure_threshold: u32,
    /// How long a degraded remote tier waits before the next probe (ms).
    pub remote_retry_cooldown_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_object_cache: true,
            enable_response_cache: true,
            article_limit: DEFAULT_ARTICLE_LIMIT,
            project_limit: DEFAULT_PROJECT_LIMIT,
            list_limit: DEFAULT_LIST_LIMIT,
            view_count_limit: DEFAULT_VIEW_COUNT_LIMIT,
            response_limit: DEFAULT_RESPONSE_LIMIT,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            remote_op_timeout_ms: DEFAULT_REMOTE_OP_TIMEOUT_MS,
            remote_entry_ttl_secs: DEFAULT_REMOTE_ENTRY_TTL_SECS,
            remote_failure_threshold: DEFAULT_REMOTE_FAILURE_THRESHOLD,
            remote_retry_cooldown_ms: DEFAULT_REMOTE_RETRY_COOLDOWN_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable_object_cache: settings.enable_object_cache,
            enable_response_cache: settings.enable_response_cache,
            article_limit: settings.article_limit,
            project_limit: settings.project_limit,
            list_limit: settings.list_limit,
            view_count_limit: settings.view_count_limit,
            response_limit: settings.response_limit,
            auto_consume_interval_ms: settings.auto_consume_interval_ms,
            consume_batch_limit: settings.consume_batch_limit,
            remote_op_timeout_ms: settings.remote_op_timeout_ms,
            remote_entry_ttl_secs: settings.remote_entry_ttl_secs,
            remote_failure_threshold: settings.remote_failure_threshold,
            remote_retry_cooldown_ms: settings.remote_retry_cooldown_ms,
        }
    }
}

impl CacheConfig {
    /// Returns true if any cache layer is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enable_object_cache || self.enable_response_cache
    }

    pub fn article_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.article_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn project_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.project_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn list_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.list_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn view_count_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.view_count_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.response_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn remote_op_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_op_timeout_ms)
    }

    pub fn remote_retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.remote_retry_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enable_object_cache);
        assert!(config.enable_response_cache);
        assert_eq!(config.article_limit, 500);
        assert_eq!(config.project_limit, 200);
        assert_eq!(config.list_limit, 50);
        assert_eq!(config.response_limit, 200);
        assert_eq!(config.auto_consume_interval_ms, 5000);
        assert_eq!(config.consume_batch_limit, 100);
        assert_eq!(config.remote_failure_threshold, 3);
    }

    #[test]
    fn is_enabled_when_object_only() {
        let config = CacheConfig {
            enable_object_cache: true,
            enable_response_cache: false,
            ..Default::default()
        };
        assert!(config.is_enabled());
    }

    #[test]
    fn is_disabled_when_both_off() {
        let config = CacheConfig {
            enable_object_cache: false,
            enable_response_cache: false,
            ..Default::default()
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            article_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.article_limit_non_zero().get(), 1);
    }
}
