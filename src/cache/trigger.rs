//! Cache trigger service.
//!
//! High-level API for publishing cache events and optionally consuming them
//! immediately.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

/// Cache trigger for publishing cache events.
///
/// Wraps the event queue and consumer with convenience methods for the
/// write paths.
pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Publish an event and optionally consume immediately.
    ///
    /// With `consume_now` false, events wait for the background consumption
    /// interval or the next explicit consumption.
    pub async fn trigger(&self, kind: EventKind, consume_now: bool) {
        if !self.config.is_enabled() {
            debug!(event_kind = ?kind, "Cache trigger skipped: cache disabled");
            return;
        }

        self.queue.publish(kind);

        if consume_now {
            self.consumer.consume().await;
        }
    }

    /// Trigger an article upsert event (create, edit, publish state change).
    pub async fn article_upserted(&self, article_id: Uuid, slug: &str) {
        self.trigger(
            EventKind::ArticleUpserted {
                article_id,
                slug: slug.to_string(),
            },
            true,
        )
        .await;
    }

    /// Trigger an article delete event.
    pub async fn article_deleted(&self, article_id: Uuid, slug: &str) {
        self.trigger(
            EventKind::ArticleDeleted {
                article_id,
                slug: slug.to_string(),
            },
            true,
        )
        .await;
    }

    /// Trigger a project upsert event (create or update).
    pub async fn project_upserted(&self, project_id: Uuid) {
        self.trigger(EventKind::ProjectUpserted { project_id }, true)
            .await;
    }

    /// Trigger a project delete event.
    pub async fn project_deleted(&self, project_id: Uuid) {
        self.trigger(EventKind::ProjectDeleted { project_id }, true)
            .await;
    }

    /// Trigger a view-count refresh. View bumps are frequent, so the
    /// refresh rides the background consumption interval.
    pub async fn article_viewed(&self, slug: &str) {
        self.trigger(
            EventKind::ArticleViewed {
                slug: slug.to_string(),
            },
            false,
        )
        .await;
    }

    /// Trigger a warmup event on application startup.
    pub async fn warmup_on_startup(&self) {
        self.trigger(EventKind::WarmupOnStartup, true).await;
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::facade::CacheStore;
    use crate::cache::registry::CacheRegistry;

    fn create_trigger_with_config(config: CacheConfig) -> CacheTrigger {
        let store = Arc::new(CacheStore::new(config.clone(), None));
        let registry = Arc::new(CacheRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new_without_sources(
            config.clone(),
            store,
            registry,
            queue.clone(),
        ));

        CacheTrigger::new(config, queue, consumer)
    }

    fn create_trigger() -> CacheTrigger {
        create_trigger_with_config(CacheConfig::default())
    }

    #[tokio::test]
    async fn trigger_publishes_event() {
        let trigger = create_trigger();

        assert!(trigger.queue.is_empty());

        trigger.trigger(EventKind::WarmupOnStartup, false).await;

        assert_eq!(trigger.queue.len(), 1);
    }

    #[tokio::test]
    async fn trigger_respects_disabled_config() {
        let config = CacheConfig {
            enable_object_cache: false,
            enable_response_cache: false,
            ..Default::default()
        };
        let trigger = create_trigger_with_config(config);

        trigger.article_upserted(Uuid::nil(), "test").await;

        assert!(trigger.queue.is_empty());
    }

    #[tokio::test]
    async fn trigger_consumes_immediately_when_requested() {
        let trigger = create_trigger();

        trigger.article_upserted(Uuid::nil(), "test").await;

        assert!(trigger.queue.is_empty());
    }

    #[tokio::test]
    async fn view_events_wait_for_background_consumption() {
        let trigger = create_trigger();

        trigger.article_viewed("test").await;

        assert_eq!(trigger.queue.len(), 1);
    }

    #[tokio::test]
    async fn convenience_methods_work() {
        let trigger = create_trigger();

        trigger.article_upserted(Uuid::nil(), "article-slug").await;
        trigger.article_deleted(Uuid::nil(), "article-slug").await;
        trigger.project_upserted(Uuid::nil()).await;
        trigger.project_deleted(Uuid::nil()).await;
        trigger.warmup_on_startup().await;

        assert!(trigger.queue.is_empty());
    }
}
