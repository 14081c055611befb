//! Cache consumer for executing consumption plans.
//!
//! Drains the event queue, plans, then invalidates and warms through the
//! two-tier store.

use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::repos::{ArticleScope, ArticlesRepo, PageRequest, ProjectsRepo, ViewsRepo};

use super::config::CacheConfig;
use super::events::EventQueue;
use super::facade::CacheStore;
use super::keys::{CacheKey, EntityKey, ObjectKey, hash_page_request};
use super::planner::ConsumptionPlan;
use super::registry::CacheRegistry;

const METRIC_CACHE_CONSUME_MS: &str = "vetrina_cache_consume_ms";
const METRIC_CACHE_WARM_MS: &str = "vetrina_cache_warm_ms";

/// Read-side repositories the consumer warms from.
#[derive(Clone)]
pub struct WarmSources {
    pub articles: Arc<dyn ArticlesRepo>,
    pub projects: Arc<dyn ProjectsRepo>,
    pub views: Arc<dyn ViewsRepo>,
}

/// Cache consumer that processes events and maintains cache consistency.
///
/// Per batch: drain events, build a consumption plan, invalidate direct
/// object entries, invalidate registered entries via the registry, then
/// warm from the repositories.
pub struct CacheConsumer {
    config: CacheConfig,
    store: Arc<CacheStore>,
    registry: Arc<CacheRegistry>,
    queue: Arc<EventQueue>,
    sources: Option<WarmSources>,
    #[cfg(test)]
    warm_invocations: AtomicUsize,
}

impl CacheConsumer {
    /// Create a new cache consumer with repository access for warming.
    pub fn new(
        config: CacheConfig,
        store: Arc<CacheStore>,
        registry: Arc<CacheRegistry>,
        queue: Arc<EventQueue>,
        sources: WarmSources,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            queue,
            sources: Some(sources),
            #[cfg(test)]
            warm_invocations: AtomicUsize::new(0),
        }
    }

    /// Create a cache consumer without repository access (warming disabled).
    pub fn new_without_sources(
        config: CacheConfig,
        store: Arc<CacheStore>,
        registry: Arc<CacheRegistry>,
        queue: Arc<EventQueue>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            queue,
            sources: None,
            #[cfg(test)]
            warm_invocations: AtomicUsize::new(0),
        }
    }

    /// Consume pending events and execute the plan.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> bool {
        self.consume_with_mode(true).await
    }

    /// Consume pending events and run only invalidation actions.
    ///
    /// Useful on latency-sensitive write paths where pre-warming is deferred.
    #[instrument(skip(self))]
    pub async fn consume_invalidate_only(&self) -> bool {
        self.consume_with_mode(false).await
    }

    async fn consume_with_mode(&self, include_warm: bool) -> bool {
        let consume_started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = ConsumptionPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            include_warm,
            "Cache consumption starting"
        );

        // Phase 1: direct object entries
        if self.config.enable_object_cache && !plan.invalidate_entities.is_empty() {
            self.invalidate_objects(&plan).await;
        }

        // Phase 2: everything the registry tracked against these entities
        if !plan.invalidate_entities.is_empty() {
            self.invalidate_registered(&plan).await;
        }

        // Phase 3: warm from the repositories
        if include_warm && self.config.enable_object_cache && self.has_warm_actions(&plan) {
            self.warm(&plan).await;
        }

        info!(
            event_count,
            invalidated = plan.invalidate_entities.len(),
            "Cache consumption complete"
        );

        histogram!(
            METRIC_CACHE_CONSUME_MS,
            "mode" => if include_warm { "full" } else { "invalidate_only" }
        )
        .record(consume_started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    fn has_warm_actions(&self, plan: &ConsumptionPlan) -> bool {
        !plan.warm_articles.is_empty()
            || !plan.warm_projects.is_empty()
            || !plan.warm_view_counts.is_empty()
            || plan.warm_article_index
            || plan.warm_project_index
            || plan.warm_sitemap
    }

    async fn invalidate_objects(&self, plan: &ConsumptionPlan) {
        for entity in &plan.invalidate_entities {
            match entity {
                EntityKey::Article(id) => {
                    self.store
                        .remove(&CacheKey::Object(ObjectKey::ArticleById(*id)))
                        .await;
                }
                EntityKey::ArticleSlug(slug) => {
                    self.store
                        .remove(&CacheKey::Object(ObjectKey::ArticleBySlug(slug.clone())))
                        .await;
                }
                EntityKey::Project(id) => {
                    self.store
                        .remove(&CacheKey::Object(ObjectKey::ProjectById(*id)))
                        .await;
                }
                EntityKey::ArticleViews(slug) => {
                    self.store
                        .remove(&CacheKey::Object(ObjectKey::ViewCount(slug.clone())))
                        .await;
                }
                EntityKey::ArticlesIndex => {
                    // Any mutation can shift any page, so every cached
                    // page of the listing goes.
                    self.store.invalidate_article_lists().await;
                }
                EntityKey::ProjectsIndex => {
                    self.store.invalidate_project_lists().await;
                }
                EntityKey::Sitemap => {
                    self.store
                        .remove(&CacheKey::Object(ObjectKey::Sitemap))
                        .await;
                    self.store
                        .remove(&CacheKey::Object(ObjectKey::ImageSitemap))
                        .await;
                }
            }
        }
    }

    async fn invalidate_registered(&self, plan: &ConsumptionPlan) {
        for entity in &plan.invalidate_entities {
            let keys = self.registry.keys_for_entity(entity);
            for key in keys {
                self.store.remove(&key).await;
                self.registry.unregister(&key);
            }
        }
    }

    /// Warm the cache based on the plan.
    ///
    /// Skipped if repository access is not available.
    async fn warm(&self, plan: &ConsumptionPlan) {
        let warm_started_at = Instant::now();
        #[cfg(test)]
        self.warm_invocations.fetch_add(1, Ordering::Relaxed);

        let Some(sources) = &self.sources else {
            debug!("Warming skipped: no repository access");
            histogram!(METRIC_CACHE_WARM_MS)
                .record(warm_started_at.elapsed().as_secs_f64() * 1000.0);
            return;
        };

        for article_id in &plan.warm_articles {
            if let Ok(Some(article)) = sources.articles.get_article_by_id(*article_id).await {
                self.store.set_article(article).await;
            }
        }
        if !plan.warm_articles.is_empty() {
            debug!(count = plan.warm_articles.len(), "Warmed: articles");
        }

        for project_id in &plan.warm_projects {
            if let Ok(Some(project)) = sources.projects.get_project(*project_id).await {
                self.store.set_project(project).await;
            }
        }
        if !plan.warm_projects.is_empty() {
            debug!(count = plan.warm_projects.len(), "Warmed: projects");
        }

        for slug in &plan.warm_view_counts {
            if let Ok(count) = sources.views.count_views(slug).await {
                self.store.set_view_count(slug, count).await;
            }
        }
        if !plan.warm_view_counts.is_empty() {
            debug!(count = plan.warm_view_counts.len(), "Warmed: view counters");
        }

        if plan.warm_article_index {
            let request = PageRequest::default();
            if let Ok(page) = sources
                .articles
                .list_articles(ArticleScope::Public, request)
                .await
            {
                for article in &page.items {
                    self.store.set_article(article.clone()).await;
                }
                let page_hash = hash_page_request(&request);
                self.store.set_article_list(page_hash, page).await;
                self.registry.register(
                    CacheKey::Object(ObjectKey::ArticleList { page_hash }),
                    [EntityKey::ArticlesIndex].into_iter().collect(),
                );
                debug!("Warmed: first article listing page");
            }
        }

        if plan.warm_project_index {
            let request = PageRequest::default();
            if let Ok(page) = sources.projects.list_projects(request).await {
                for project in &page.items {
                    self.store.set_project(project.clone()).await;
                }
                let page_hash = hash_page_request(&request);
                self.store.set_project_list(page_hash, page).await;
                self.registry.register(
                    CacheKey::Object(ObjectKey::ProjectList { page_hash }),
                    [EntityKey::ProjectsIndex].into_iter().collect(),
                );
                debug!("Warmed: first project listing page");
            }
        }

        // Sitemaps rebuild on first request via read-through
        if plan.warm_sitemap {
            debug!("Sitemap warming deferred to first request");
        }

        histogram!(METRIC_CACHE_WARM_MS).record(warm_started_at.elapsed().as_secs_f64() * 1000.0);
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    #[cfg(test)]
    fn warm_invocation_count(&self) -> usize {
        self.warm_invocations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::events::EventKind;
    use crate::domain::entities::ArticleRecord;

    fn create_consumer() -> CacheConsumer {
        let config = CacheConfig::default();
        let store = Arc::new(CacheStore::new(config.clone(), None));
        let registry = Arc::new(CacheRegistry::new());
        let queue = Arc::new(EventQueue::new());

        CacheConsumer::new_without_sources(config, store, registry, queue)
    }

    fn sample_article(id: Uuid, slug: &str) -> ArticleRecord {
        ArticleRecord {
            id,
            slug: slug.to_string(),
            title: "Title".to_string(),
            content: "<p>Body</p>".to_string(),
            is_published: true,
            published_at: Some(OffsetDateTime::now_utc()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn consume_empty_queue_returns_false() {
        let consumer = create_consumer();
        assert!(!consumer.consume().await);
    }

    #[tokio::test]
    async fn consume_processes_events() {
        let consumer = create_consumer();

        consumer.queue.publish(EventKind::WarmupOnStartup);
        consumer.queue.publish(EventKind::ProjectUpserted {
            project_id: Uuid::nil(),
        });

        assert_eq!(consumer.queue.len(), 2);
        assert!(consumer.consume().await);
        assert!(consumer.queue.is_empty());
    }

    #[tokio::test]
    async fn consume_respects_batch_limit() {
        let config = CacheConfig {
            consume_batch_limit: 2,
            ..Default::default()
        };
        let store = Arc::new(CacheStore::new(config.clone(), None));
        let registry = Arc::new(CacheRegistry::new());
        let queue = Arc::new(EventQueue::new());

        let consumer = CacheConsumer::new_without_sources(config, store, registry, queue);

        for _ in 0..5 {
            consumer.queue.publish(EventKind::WarmupOnStartup);
        }

        assert_eq!(consumer.queue.len(), 5);
        consumer.consume().await;
        assert_eq!(consumer.queue.len(), 3);
    }

    #[tokio::test]
    async fn consume_invalidate_only_skips_warm_phase() {
        let consumer = create_consumer();

        consumer.queue.publish(EventKind::WarmupOnStartup);
        assert!(consumer.consume_invalidate_only().await);
        assert_eq!(consumer.warm_invocation_count(), 0);

        consumer.queue.publish(EventKind::WarmupOnStartup);
        assert!(consumer.consume().await);
        assert_eq!(consumer.warm_invocation_count(), 1);
    }

    #[tokio::test]
    async fn upsert_event_drops_cached_article() {
        let consumer = create_consumer();

        let id = Uuid::new_v4();
        consumer.store.set_article(sample_article(id, "hello")).await;
        assert!(consumer.store.get_article_by_id(id).await.is_some());

        consumer.queue.publish(EventKind::ArticleUpserted {
            article_id: id,
            slug: "hello".to_string(),
        });
        consumer.consume().await;

        assert!(consumer.store.get_article_by_id(id).await.is_none());
        assert!(consumer.store.get_article_by_slug("hello").await.is_none());
    }

    #[tokio::test]
    async fn upsert_event_drops_every_cached_list_page() {
        use crate::application::repos::OffsetPage;

        let consumer = create_consumer();

        // A page hash no warm step ever touches.
        let page = OffsetPage::new(
            vec![sample_article(Uuid::new_v4(), "listed")],
            PageRequest::new(Some(2), Some(5)),
            11,
        );
        consumer.store.set_article_list(42, page).await;

        consumer.queue.publish(EventKind::ArticleUpserted {
            article_id: Uuid::new_v4(),
            slug: "listed".to_string(),
        });
        consumer.consume().await;

        assert!(consumer.store.get_article_list(42).await.is_none());
    }

    #[tokio::test]
    async fn registered_response_entries_are_removed() {
        use crate::cache::keys::ResponseKey;
        use crate::cache::store::CachedResponse;

        let consumer = create_consumer();

        let key = ResponseKey::Response {
            path: "/api/articles".to_string(),
            query_hash: 0,
        };
        consumer
            .store
            .store_response(
                key.clone(),
                CachedResponse {
                    status: 200,
                    headers: vec![],
                    body: b"{}".to_vec(),
                },
            )
            .await;
        consumer.registry.register(
            CacheKey::Response(key.clone()),
            [EntityKey::ArticlesIndex].into_iter().collect(),
        );

        consumer.queue.publish(EventKind::ArticleUpserted {
            article_id: Uuid::new_v4(),
            slug: "anything".to_string(),
        });
        consumer.consume().await;

        assert!(consumer.store.get_response(&key).await.is_none());
        assert_eq!(consumer.registry.key_count(), 0);
    }
}
