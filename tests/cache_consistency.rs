//! End-to-end invalidation pipeline tests against in-memory repositories.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use serde_json::json;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use vetrina::application::articles::{ArticleQueryError, ArticleQueryService};
use vetrina::application::projects::ProjectQueryService;
use vetrina::application::repos::{
    ArticleScope, ArticlesRepo, CreateArticleParams, OffsetPage, PageRequest, ProjectsRepo,
    RecordViewParams, RepoError, ViewsRepo,
};
use vetrina::application::views::ViewTracker;
use vetrina::cache::{
    CacheConfig, CacheConsumer, CacheRegistry, CacheState, CacheStore, CacheTrigger, EntityKey,
    EventQueue, WarmSources, response_cache_layer,
};
use vetrina::domain::entities::{ArticleRecord, ProjectRecord};

#[derive(Default)]
struct FakeArticles {
    records: Mutex<Vec<ArticleRecord>>,
}

impl FakeArticles {
    fn insert(&self, params: CreateArticleParams) -> ArticleRecord {
        let now = OffsetDateTime::now_utc();
        let record = ArticleRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            title: params.title,
            content: params.content,
            is_published: params.is_published,
            published_at: params.is_published.then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.records.lock().unwrap().push(record.clone());
        record
    }

    fn replace_content(&self, id: Uuid, content: &str) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|record| record.id == id) {
            record.content = content.to_string();
            record.updated_at = OffsetDateTime::now_utc();
        }
    }
}

#[async_trait]
impl ArticlesRepo for FakeArticles {
    async fn list_articles(
        &self,
        scope: ArticleScope,
        page: PageRequest,
    ) -> Result<OffsetPage<ArticleRecord>, RepoError> {
        let records = self.records.lock().unwrap();
        let visible: Vec<ArticleRecord> = records
            .iter()
            .filter(|record| scope == ArticleScope::Admin || record.is_published)
            .cloned()
            .collect();
        let total = visible.len() as i64;
        let items = visible
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page() as usize)
            .collect();
        Ok(OffsetPage::new(items, page, total))
    }

    async fn get_article_by_slug(
        &self,
        scope: ArticleScope,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|record| {
                record.slug == slug && (scope == ArticleScope::Admin || record.is_published)
            })
            .cloned())
    }

    async fn get_article_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().find(|record| record.id == id).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().any(|record| record.slug == slug))
    }

    async fn list_published_slugs(&self) -> Result<Vec<ArticleRecord>, RepoError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|record| record.is_published)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeProjects {
    records: Mutex<Vec<ProjectRecord>>,
}

impl FakeProjects {
    fn insert(&self, title: &str) -> ProjectRecord {
        let record = ProjectRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "A project".to_string(),
            image_url: None,
            technologies: "Rust".to_string(),
            github_link: None,
            live_demo_link: None,
            date_added: OffsetDateTime::now_utc(),
        };
        self.records.lock().unwrap().push(record.clone());
        record
    }
}

#[async_trait]
impl ProjectsRepo for FakeProjects {
    async fn list_projects(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ProjectRecord>, RepoError> {
        let records = self.records.lock().unwrap();
        let total = records.len() as i64;
        let items = records
            .iter()
            .skip(page.offset() as usize)
            .take(page.per_page() as usize)
            .cloned()
            .collect();
        Ok(OffsetPage::new(items, page, total))
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().find(|record| record.id == id).cloned())
    }
}

#[derive(Default)]
struct FakeViews {
    seen: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ViewsRepo for FakeViews {
    async fn record_view(&self, params: RecordViewParams) -> Result<bool, RepoError> {
        let mut seen = self.seen.lock().unwrap();
        let key = (params.article_slug, params.ip_address);
        if seen.contains(&key) {
            return Ok(false);
        }
        seen.push(key);
        Ok(true)
    }

    async fn count_views(&self, article_slug: &str) -> Result<i64, RepoError> {
        let seen = self.seen.lock().unwrap();
        Ok(seen.iter().filter(|(slug, _)| slug == article_slug).count() as i64)
    }

    async fn delete_views_for(&self, article_slug: &str) -> Result<u64, RepoError> {
        let mut seen = self.seen.lock().unwrap();
        let before = seen.len();
        seen.retain(|(slug, _)| slug != article_slug);
        Ok((before - seen.len()) as u64)
    }
}

struct Harness {
    articles: Arc<FakeArticles>,
    projects: Arc<FakeProjects>,
    views: Arc<FakeViews>,
    store: Arc<CacheStore>,
    registry: Arc<CacheRegistry>,
    trigger: Arc<CacheTrigger>,
}

fn harness() -> Harness {
    let articles = Arc::new(FakeArticles::default());
    let projects = Arc::new(FakeProjects::default());
    let views = Arc::new(FakeViews::default());

    let config = CacheConfig::default();
    let store = Arc::new(CacheStore::new(config.clone(), None));
    let registry = Arc::new(CacheRegistry::new());
    let queue = Arc::new(EventQueue::new());
    let consumer = Arc::new(CacheConsumer::new(
        config.clone(),
        store.clone(),
        registry.clone(),
        queue.clone(),
        WarmSources {
            articles: articles.clone(),
            projects: projects.clone(),
            views: views.clone(),
        },
    ));
    let trigger = Arc::new(CacheTrigger::new(config, queue, consumer));

    Harness {
        articles,
        projects,
        views,
        store,
        registry,
        trigger,
    }
}

fn published(slug: &str, content: &str) -> CreateArticleParams {
    CreateArticleParams {
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        content: content.to_string(),
        is_published: true,
    }
}

#[tokio::test]
async fn upsert_event_purges_stale_article_from_cache() {
    let h = harness();
    let record = h.articles.insert(published("first-post", "<p>original</p>"));

    let service = ArticleQueryService::new(
        h.articles.clone(),
        h.views.clone(),
        Some(h.store.clone()),
    );

    let before = service.get_published("first-post").await.unwrap();
    assert!(before.content.contains("original"));

    // Edit behind the cache, then publish the invalidation event.
    h.articles.replace_content(record.id, "<p>updated</p>");
    let stale = service.get_published("first-post").await.unwrap();
    assert!(stale.content.contains("original"), "cache still serves the old copy");

    h.trigger.article_upserted(record.id, "first-post").await;

    let fresh = service.get_published("first-post").await.unwrap();
    assert!(fresh.content.contains("updated"));
}

#[tokio::test]
async fn article_listing_pages_refresh_after_a_publish() {
    let h = harness();
    for n in 0..3 {
        h.articles.insert(published(&format!("post-{n}"), "<p>text</p>"));
    }

    let service = ArticleQueryService::new(
        h.articles.clone(),
        h.views.clone(),
        Some(h.store.clone()),
    );

    // A page shape the warm step never re-caches.
    let page = PageRequest::new(Some(1), Some(2));
    let before = service.list_published(page).await.unwrap();
    assert_eq!(before.total, 3);

    let added = h.articles.insert(published("post-3", "<p>text</p>"));
    h.trigger.article_upserted(added.id, "post-3").await;

    let after = service.list_published(page).await.unwrap();
    assert_eq!(after.total, 4, "cached page picks up the new article");
    assert_eq!(after.total_pages, 2);
}

#[tokio::test]
async fn project_listing_pages_refresh_after_an_upsert() {
    let h = harness();
    for n in 0..3 {
        h.projects.insert(&format!("Project {n}"));
    }

    let service = ProjectQueryService::new(h.projects.clone(), Some(h.store.clone()));

    let page = PageRequest::new(Some(2), Some(2));
    let before = service.list(page).await.unwrap();
    assert_eq!(before.total, 3);
    assert_eq!(before.items.len(), 1);

    let added = h.projects.insert("Project 3");
    h.trigger.project_upserted(added.id).await;

    let after = service.list(page).await.unwrap();
    assert_eq!(after.total, 4);
    assert_eq!(after.items.len(), 2, "second page now holds two projects");
}

#[tokio::test]
async fn deleted_article_stops_resolving() {
    let h = harness();
    let record = h.articles.insert(published("to-delete", "<p>bye</p>"));

    let service = ArticleQueryService::new(
        h.articles.clone(),
        h.views.clone(),
        Some(h.store.clone()),
    );
    service.get_published("to-delete").await.unwrap();

    h.articles
        .records
        .lock()
        .unwrap()
        .retain(|existing| existing.id != record.id);
    h.trigger.article_deleted(record.id, "to-delete").await;

    let result = service.get_published("to-delete").await;
    assert!(matches!(result, Err(ArticleQueryError::NotFound)));
}

#[tokio::test]
async fn drafts_are_invisible_to_the_public_surface() {
    let h = harness();
    h.articles.insert(CreateArticleParams {
        slug: "secret-draft".to_string(),
        title: "Secret".to_string(),
        content: "<p>wip</p>".to_string(),
        is_published: false,
    });

    let service = ArticleQueryService::new(
        h.articles.clone(),
        h.views.clone(),
        Some(h.store.clone()),
    );

    let result = service.get_published("secret-draft").await;
    assert!(matches!(result, Err(ArticleQueryError::NotFound)));

    let listing = service.list_published(PageRequest::default()).await.unwrap();
    assert!(listing.items.is_empty());
}

#[tokio::test]
async fn repeat_views_from_one_address_count_once() {
    let h = harness();
    h.articles.insert(published("viewed-post", "<p>text</p>"));

    let tracker = ViewTracker::new(h.views.clone(), Some(h.trigger.clone()));
    let params = || RecordViewParams {
        article_slug: "viewed-post".to_string(),
        ip_address: "203.0.113.9".to_string(),
        user_agent: None,
    };

    assert!(tracker.track(params()).await);
    assert!(!tracker.track(params()).await);
    assert_eq!(h.views.count_views("viewed-post").await.unwrap(), 1);
}

#[tokio::test]
async fn view_event_refreshes_cached_counter() {
    let h = harness();
    h.articles.insert(published("counted", "<p>text</p>"));

    let service = ArticleQueryService::new(
        h.articles.clone(),
        h.views.clone(),
        Some(h.store.clone()),
    );
    assert_eq!(service.get_published("counted").await.unwrap().views, 0);

    let tracker = ViewTracker::new(h.views.clone(), Some(h.trigger.clone()));
    tracker
        .track(RecordViewParams {
            article_slug: "counted".to_string(),
            ip_address: "198.51.100.4".to_string(),
            user_agent: None,
        })
        .await;

    // View events ride the background interval; run the consumer directly.
    h.trigger.consumer().consume().await;

    assert_eq!(service.get_published("counted").await.unwrap().views, 1);
}

#[derive(Clone)]
struct CountingState {
    hits: Arc<AtomicUsize>,
}

async fn counted_handler(State(state): State<CountingState>) -> Json<serde_json::Value> {
    vetrina::cache::deps::record(EntityKey::ArticlesIndex);
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "hit": hit }))
}

#[tokio::test]
async fn response_cache_serves_hits_until_dependency_changes() {
    let h = harness();
    let hits = Arc::new(AtomicUsize::new(0));

    let cache_state = CacheState {
        config: CacheConfig::default(),
        store: h.store.clone(),
        registry: h.registry.clone(),
    };

    let app = Router::new()
        .route("/api/articles", get(counted_handler))
        .with_state(CountingState { hits: hits.clone() })
        .layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ));

    let request = || {
        Request::builder()
            .uri("/api/articles")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let second = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "second request is a cache hit");

    // Any article change invalidates responses that depend on the index.
    h.trigger.article_upserted(Uuid::new_v4(), "new-post").await;

    let third = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(third.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 2, "invalidation reaches the handler again");
}
