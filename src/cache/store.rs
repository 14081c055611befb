//! In-process cache storage.
//!
//! Object tier: domain entities and query results.
//! Response tier: serialized HTTP responses for public routes.
//!
//! Both tiers are the always-available fallback behind the remote tier; a
//! lost entry is only a miss.

use std::sync::RwLock;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::repos::OffsetPage;
use crate::domain::entities::{ArticleRecord, ProjectRecord};

use super::config::CacheConfig;
use super::keys::ResponseKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// In-process object/query cache with LRU eviction.
pub struct ObjectStore {
    articles_by_id: RwLock<LruCache<Uuid, ArticleRecord>>,
    articles_by_slug: RwLock<LruCache<String, ArticleRecord>>,
    projects_by_id: RwLock<LruCache<Uuid, ProjectRecord>>,
    view_counts: RwLock<LruCache<String, i64>>,

    // List pages keyed by pagination hash
    article_lists: RwLock<LruCache<u64, OffsetPage<ArticleRecord>>>,
    project_lists: RwLock<LruCache<u64, OffsetPage<ProjectRecord>>>,

    // Singleton documents
    sitemap: RwLock<Option<String>>,
    image_sitemap: RwLock<Option<String>>,
}

impl ObjectStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            articles_by_id: RwLock::new(LruCache::new(config.article_limit_non_zero())),
            articles_by_slug: RwLock::new(LruCache::new(config.article_limit_non_zero())),
            projects_by_id: RwLock::new(LruCache::new(config.project_limit_non_zero())),
            view_counts: RwLock::new(LruCache::new(config.view_count_limit_non_zero())),
            article_lists: RwLock::new(LruCache::new(config.list_limit_non_zero())),
            project_lists: RwLock::new(LruCache::new(config.list_limit_non_zero())),
            sitemap: RwLock::new(None),
            image_sitemap: RwLock::new(None),
        }
    }

    pub fn get_article_by_id(&self, id: Uuid) -> Option<ArticleRecord> {
        rw_write(&self.articles_by_id, SOURCE, "get_article_by_id")
            .get(&id)
            .cloned()
    }

    pub fn get_article_by_slug(&self, slug: &str) -> Option<ArticleRecord> {
        rw_write(&self.articles_by_slug, SOURCE, "get_article_by_slug")
            .get(slug)
            .cloned()
    }

    pub fn set_article(&self, article: ArticleRecord) {
        let mut by_id = rw_write(&self.articles_by_id, SOURCE, "set_article.by_id");
        let mut by_slug = rw_write(&self.articles_by_slug, SOURCE, "set_article.by_slug");
        by_id.put(article.id, article.clone());
        by_slug.put(article.slug.clone(), article);
    }

    pub fn invalidate_article(&self, id: Uuid, slug: &str) {
        rw_write(&self.articles_by_id, SOURCE, "invalidate_article.by_id").pop(&id);
        rw_write(&self.articles_by_slug, SOURCE, "invalidate_article.by_slug").pop(slug);
    }

    pub fn get_project(&self, id: Uuid) -> Option<ProjectRecord> {
        rw_write(&self.projects_by_id, SOURCE, "get_project")
            .get(&id)
            .cloned()
    }

    pub fn set_project(&self, project: ProjectRecord) {
        rw_write(&self.projects_by_id, SOURCE, "set_project").put(project.id, project);
    }

    pub fn invalidate_project(&self, id: Uuid) {
        rw_write(&self.projects_by_id, SOURCE, "invalidate_project").pop(&id);
    }

    pub fn get_view_count(&self, slug: &str) -> Option<i64> {
        rw_write(&self.view_counts, SOURCE, "get_view_count")
            .get(slug)
            .copied()
    }

    pub fn set_view_count(&self, slug: &str, count: i64) {
        rw_write(&self.view_counts, SOURCE, "set_view_count").put(slug.to_string(), count);
    }

    pub fn invalidate_view_count(&self, slug: &str) {
        rw_write(&self.view_counts, SOURCE, "invalidate_view_count").pop(slug);
    }

    pub fn get_article_list(&self, page_hash: u64) -> Option<OffsetPage<ArticleRecord>> {
        rw_write(&self.article_lists, SOURCE, "get_article_list")
            .get(&page_hash)
            .cloned()
    }

    pub fn set_article_list(&self, page_hash: u64, page: OffsetPage<ArticleRecord>) {
        rw_write(&self.article_lists, SOURCE, "set_article_list").put(page_hash, page);
    }

    pub fn invalidate_article_list(&self, page_hash: u64) {
        rw_write(&self.article_lists, SOURCE, "invalidate_article_list").pop(&page_hash);
    }

    pub fn invalidate_all_article_lists(&self) {
        rw_write(&self.article_lists, SOURCE, "invalidate_all_article_lists").clear();
    }

    pub fn get_project_list(&self, page_hash: u64) -> Option<OffsetPage<ProjectRecord>> {
        rw_write(&self.project_lists, SOURCE, "get_project_list")
            .get(&page_hash)
            .cloned()
    }

    pub fn set_project_list(&self, page_hash: u64, page: OffsetPage<ProjectRecord>) {
        rw_write(&self.project_lists, SOURCE, "set_project_list").put(page_hash, page);
    }

    pub fn invalidate_project_list(&self, page_hash: u64) {
        rw_write(&self.project_lists, SOURCE, "invalidate_project_list").pop(&page_hash);
    }

    pub fn invalidate_all_project_lists(&self) {
        rw_write(&self.project_lists, SOURCE, "invalidate_all_project_lists").clear();
    }

    pub fn get_sitemap(&self) -> Option<String> {
        rw_read(&self.sitemap, SOURCE, "get_sitemap").clone()
    }

    pub fn set_sitemap(&self, document: String) {
        *rw_write(&self.sitemap, SOURCE, "set_sitemap") = Some(document);
    }

    pub fn invalidate_sitemap(&self) {
        *rw_write(&self.sitemap, SOURCE, "invalidate_sitemap") = None;
    }

    pub fn get_image_sitemap(&self) -> Option<String> {
        rw_read(&self.image_sitemap, SOURCE, "get_image_sitemap").clone()
    }

    pub fn set_image_sitemap(&self, document: String) {
        *rw_write(&self.image_sitemap, SOURCE, "set_image_sitemap") = Some(document);
    }

    pub fn invalidate_image_sitemap(&self) {
        *rw_write(&self.image_sitemap, SOURCE, "invalidate_image_sitemap") = None;
    }

    /// Clear all cached data.
    pub fn clear(&self) {
        rw_write(&self.articles_by_id, SOURCE, "clear.articles_by_id").clear();
        rw_write(&self.articles_by_slug, SOURCE, "clear.articles_by_slug").clear();
        rw_write(&self.projects_by_id, SOURCE, "clear.projects_by_id").clear();
        rw_write(&self.view_counts, SOURCE, "clear.view_counts").clear();
        rw_write(&self.article_lists, SOURCE, "clear.article_lists").clear();
        rw_write(&self.project_lists, SOURCE, "clear.project_lists").clear();
        self.invalidate_sitemap();
        self.invalidate_image_sitemap();
    }
}

/// Cached HTTP response.
///
/// Serializable so the remote tier can hold it as JSON.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// In-process response cache.
pub struct ResponseStore {
    responses: RwLock<LruCache<ResponseKey, CachedResponse>>,
}

impl ResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            responses: RwLock::new(LruCache::new(config.response_limit_non_zero())),
        }
    }

    pub fn get(&self, key: &ResponseKey) -> Option<CachedResponse> {
        rw_write(&self.responses, SOURCE, "response_get")
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: ResponseKey, response: CachedResponse) -> Option<ResponseKey> {
        rw_write(&self.responses, SOURCE, "response_set")
            .push(key, response)
            .map(|(evicted_key, _)| evicted_key)
    }

    pub fn invalidate(&self, key: &ResponseKey) {
        rw_write(&self.responses, SOURCE, "response_invalidate").pop(key);
    }

    pub fn invalidate_all(&self) {
        rw_write(&self.responses, SOURCE, "response_invalidate_all").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.responses, SOURCE, "response_len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use time::OffsetDateTime;

    use super::*;

    fn sample_article(id: Uuid, slug: &str) -> ArticleRecord {
        ArticleRecord {
            id,
            slug: slug.to_string(),
            title: "Test Article".to_string(),
            content: "<p>Body</p>".to_string(),
            is_published: true,
            published_at: Some(OffsetDateTime::now_utc()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn article_cache_roundtrip() {
        let config = CacheConfig::default();
        let store = ObjectStore::new(&config);

        let id = Uuid::new_v4();
        let article = sample_article(id, "test-article");

        assert!(store.get_article_by_id(id).is_none());

        store.set_article(article.clone());

        let cached = store.get_article_by_id(id).expect("cached article");
        assert_eq!(cached.slug, "test-article");

        let by_slug = store
            .get_article_by_slug("test-article")
            .expect("cached by slug");
        assert_eq!(by_slug.id, id);

        store.invalidate_article(id, "test-article");

        assert!(store.get_article_by_id(id).is_none());
        assert!(store.get_article_by_slug("test-article").is_none());
    }

    #[test]
    fn sitemap_singleton_cache() {
        let config = CacheConfig::default();
        let store = ObjectStore::new(&config);

        assert!(store.get_sitemap().is_none());

        store.set_sitemap("<urlset/>".to_string());
        assert_eq!(store.get_sitemap().as_deref(), Some("<urlset/>"));

        store.invalidate_sitemap();
        assert!(store.get_sitemap().is_none());
    }

    #[test]
    fn view_count_cache() {
        let config = CacheConfig::default();
        let store = ObjectStore::new(&config);

        store.set_view_count("hello", 7);
        assert_eq!(store.get_view_count("hello"), Some(7));

        store.invalidate_view_count("hello");
        assert_eq!(store.get_view_count("hello"), None);
    }

    #[test]
    fn response_cache_roundtrip() {
        let config = CacheConfig::default();
        let store = ResponseStore::new(&config);

        let key = ResponseKey::Response {
            path: "/blog/test".to_string(),
            query_hash: 0,
        };

        assert!(store.get(&key).is_none());

        let response = CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: b"{}".to_vec(),
        };

        let evicted = store.set(key.clone(), response);
        assert!(evicted.is_none());

        let cached = store.get(&key).expect("cached response");
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, b"{}".to_vec());

        store.invalidate(&key);
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn lru_eviction() {
        let config = CacheConfig {
            article_limit: 2,
            ..Default::default()
        };
        let store = ObjectStore::new(&config);

        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let id3 = Uuid::new_v4();

        store.set_article(sample_article(id1, "article-1"));
        store.set_article(sample_article(id2, "article-2"));

        assert!(store.get_article_by_id(id1).is_some());
        assert!(store.get_article_by_id(id2).is_some());

        // Adding a third evicts the least recently used
        store.set_article(sample_article(id3, "article-3"));

        assert!(store.get_article_by_id(id1).is_none());
        assert!(store.get_article_by_id(id2).is_some());
        assert!(store.get_article_by_id(id3).is_some());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let config = CacheConfig::default();
        let store = ObjectStore::new(&config);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .sitemap
                .write()
                .expect("sitemap lock should be acquired");
            panic!("poison sitemap lock");
        }));

        store.set_sitemap("<urlset/>".to_string());
        assert!(store.get_sitemap().is_some());
    }
}
