//! Two-tier cache façade.
//!
//! `CacheStore` fronts the in-process object/response stores with an
//! optional Redis tier. Reads check the local tier first, then the remote
//! tier; remote hits repopulate the local tier. Writes land in both tiers.
//! Invalidation always clears the local tier and always attempts the remote
//! delete, so a degraded backend can serve stale data for at most one TTL.

use metrics::counter;
use uuid::Uuid;

use crate::application::repos::OffsetPage;
use crate::domain::entities::{ArticleRecord, ProjectRecord};

use super::config::CacheConfig;
use super::keys::{CacheKey, ObjectKey, ResponseKey};
use super::remote::{RemoteCache, RemoteHealth};
use super::store::{CachedResponse, ObjectStore, ResponseStore};

pub struct CacheStore {
    config: CacheConfig,
    objects: ObjectStore,
    responses: ResponseStore,
    remote: Option<RemoteCache>,
}

const ARTICLE_LIST_KEY_PREFIX: &str = "articles:list:";
const PROJECT_LIST_KEY_PREFIX: &str = "projects:list:";

fn remote_key(key: &CacheKey) -> String {
    match key {
        CacheKey::Object(ObjectKey::ArticleById(id)) => format!("article:id:{id}"),
        CacheKey::Object(ObjectKey::ArticleBySlug(slug)) => format!("article:slug:{slug}"),
        CacheKey::Object(ObjectKey::ProjectById(id)) => format!("project:{id}"),
        CacheKey::Object(ObjectKey::ViewCount(slug)) => format!("views:{slug}"),
        CacheKey::Object(ObjectKey::ArticleList { page_hash }) => {
            format!("{ARTICLE_LIST_KEY_PREFIX}{page_hash:x}")
        }
        CacheKey::Object(ObjectKey::ProjectList { page_hash }) => {
            format!("{PROJECT_LIST_KEY_PREFIX}{page_hash:x}")
        }
        CacheKey::Object(ObjectKey::Sitemap) => "sitemap".to_string(),
        CacheKey::Object(ObjectKey::ImageSitemap) => "sitemap:images".to_string(),
        CacheKey::Response(ResponseKey::Response { path, query_hash }) => {
            format!("resp:{path}?{query_hash:x}")
        }
    }
}

impl CacheStore {
    pub fn new(config: CacheConfig, remote: Option<RemoteCache>) -> Self {
        Self {
            objects: ObjectStore::new(&config),
            responses: ResponseStore::new(&config),
            remote,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote_health(&self) -> Option<RemoteHealth> {
        self.remote.as_ref().map(RemoteCache::health)
    }

    pub async fn ping_remote(&self) -> Option<bool> {
        match &self.remote {
            Some(remote) => Some(remote.ping().await),
            None => None,
        }
    }

    fn object_reads_enabled(&self) -> bool {
        self.config.enable_object_cache
    }

    async fn remote_get<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let remote = self.remote.as_ref()?;
        remote.get_json(&remote_key(key)).await
    }

    async fn remote_set<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        if let Some(remote) = &self.remote {
            remote.set_json(&remote_key(key), value).await;
        }
    }

    async fn remote_delete(&self, key: &CacheKey) {
        if let Some(remote) = &self.remote {
            remote.delete(&remote_key(key)).await;
        }
    }

    fn count_local(hit: bool) {
        if hit {
            counter!("vetrina_cache_local_hit_total").increment(1);
        } else {
            counter!("vetrina_cache_local_miss_total").increment(1);
        }
    }

    // ------------------------------------------------------------------
    // Articles
    // ------------------------------------------------------------------

    pub async fn get_article_by_id(&self, id: Uuid) -> Option<ArticleRecord> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(article) = self.objects.get_article_by_id(id) {
            Self::count_local(true);
            return Some(article);
        }
        Self::count_local(false);

        let key = CacheKey::Object(ObjectKey::ArticleById(id));
        let article: Option<ArticleRecord> = self.remote_get(&key).await;
        if let Some(article) = &article {
            self.objects.set_article(article.clone());
        }
        article
    }

    pub async fn get_article_by_slug(&self, slug: &str) -> Option<ArticleRecord> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(article) = self.objects.get_article_by_slug(slug) {
            Self::count_local(true);
            return Some(article);
        }
        Self::count_local(false);

        let key = CacheKey::Object(ObjectKey::ArticleBySlug(slug.to_string()));
        let article: Option<ArticleRecord> = self.remote_get(&key).await;
        if let Some(article) = &article {
            self.objects.set_article(article.clone());
        }
        article
    }

    pub async fn set_article(&self, article: ArticleRecord) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_article(article.clone());
        self.remote_set(
            &CacheKey::Object(ObjectKey::ArticleById(article.id)),
            &article,
        )
        .await;
        self.remote_set(
            &CacheKey::Object(ObjectKey::ArticleBySlug(article.slug.clone())),
            &article,
        )
        .await;
    }

    pub async fn invalidate_article(&self, id: Uuid, slug: &str) {
        self.objects.invalidate_article(id, slug);
        self.remote_delete(&CacheKey::Object(ObjectKey::ArticleById(id)))
            .await;
        self.remote_delete(&CacheKey::Object(ObjectKey::ArticleBySlug(slug.to_string())))
            .await;
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn get_project(&self, id: Uuid) -> Option<ProjectRecord> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(project) = self.objects.get_project(id) {
            Self::count_local(true);
            return Some(project);
        }
        Self::count_local(false);

        let key = CacheKey::Object(ObjectKey::ProjectById(id));
        let project: Option<ProjectRecord> = self.remote_get(&key).await;
        if let Some(project) = &project {
            self.objects.set_project(project.clone());
        }
        project
    }

    pub async fn set_project(&self, project: ProjectRecord) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_project(project.clone());
        self.remote_set(
            &CacheKey::Object(ObjectKey::ProjectById(project.id)),
            &project,
        )
        .await;
    }

    pub async fn invalidate_project(&self, id: Uuid) {
        self.objects.invalidate_project(id);
        self.remote_delete(&CacheKey::Object(ObjectKey::ProjectById(id)))
            .await;
    }

    // ------------------------------------------------------------------
    // View counters
    // ------------------------------------------------------------------

    pub async fn get_view_count(&self, slug: &str) -> Option<i64> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(count) = self.objects.get_view_count(slug) {
            Self::count_local(true);
            return Some(count);
        }
        Self::count_local(false);

        let key = CacheKey::Object(ObjectKey::ViewCount(slug.to_string()));
        let count: Option<i64> = self.remote_get(&key).await;
        if let Some(count) = count {
            self.objects.set_view_count(slug, count);
        }
        count
    }

    pub async fn set_view_count(&self, slug: &str, count: i64) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_view_count(slug, count);
        self.remote_set(
            &CacheKey::Object(ObjectKey::ViewCount(slug.to_string())),
            &count,
        )
        .await;
    }

    pub async fn invalidate_view_count(&self, slug: &str) {
        self.objects.invalidate_view_count(slug);
        self.remote_delete(&CacheKey::Object(ObjectKey::ViewCount(slug.to_string())))
            .await;
    }

    // ------------------------------------------------------------------
    // List pages
    // ------------------------------------------------------------------

    pub async fn get_article_list(&self, page_hash: u64) -> Option<OffsetPage<ArticleRecord>> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(page) = self.objects.get_article_list(page_hash) {
            Self::count_local(true);
            return Some(page);
        }
        Self::count_local(false);

        let key = CacheKey::Object(ObjectKey::ArticleList { page_hash });
        let page: Option<OffsetPage<ArticleRecord>> = self.remote_get(&key).await;
        if let Some(page) = &page {
            self.objects.set_article_list(page_hash, page.clone());
        }
        page
    }

    pub async fn set_article_list(&self, page_hash: u64, page: OffsetPage<ArticleRecord>) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_article_list(page_hash, page.clone());
        self.remote_set(&CacheKey::Object(ObjectKey::ArticleList { page_hash }), &page)
            .await;
    }

    /// Drop every cached article list page, local and remote. The page
    /// hashes in use are not enumerable, so the whole family goes.
    pub async fn invalidate_article_lists(&self) {
        self.objects.invalidate_all_article_lists();
        if let Some(remote) = &self.remote {
            remote.delete_prefix(ARTICLE_LIST_KEY_PREFIX).await;
        }
    }

    pub async fn get_project_list(&self, page_hash: u64) -> Option<OffsetPage<ProjectRecord>> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(page) = self.objects.get_project_list(page_hash) {
            Self::count_local(true);
            return Some(page);
        }
        Self::count_local(false);

        let key = CacheKey::Object(ObjectKey::ProjectList { page_hash });
        let page: Option<OffsetPage<ProjectRecord>> = self.remote_get(&key).await;
        if let Some(page) = &page {
            self.objects.set_project_list(page_hash, page.clone());
        }
        page
    }

    pub async fn set_project_list(&self, page_hash: u64, page: OffsetPage<ProjectRecord>) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_project_list(page_hash, page.clone());
        self.remote_set(&CacheKey::Object(ObjectKey::ProjectList { page_hash }), &page)
            .await;
    }

    /// Drop every cached project list page, local and remote.
    pub async fn invalidate_project_lists(&self) {
        self.objects.invalidate_all_project_lists();
        if let Some(remote) = &self.remote {
            remote.delete_prefix(PROJECT_LIST_KEY_PREFIX).await;
        }
    }

    // ------------------------------------------------------------------
    // Sitemap documents
    // ------------------------------------------------------------------

    pub async fn get_sitemap(&self) -> Option<String> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(document) = self.objects.get_sitemap() {
            Self::count_local(true);
            return Some(document);
        }
        Self::count_local(false);

        let document: Option<String> = self
            .remote_get(&CacheKey::Object(ObjectKey::Sitemap))
            .await;
        if let Some(document) = &document {
            self.objects.set_sitemap(document.clone());
        }
        document
    }

    pub async fn set_sitemap(&self, document: String) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_sitemap(document.clone());
        self.remote_set(&CacheKey::Object(ObjectKey::Sitemap), &document)
            .await;
    }

    pub async fn get_image_sitemap(&self) -> Option<String> {
        if !self.object_reads_enabled() {
            return None;
        }
        if let Some(document) = self.objects.get_image_sitemap() {
            Self::count_local(true);
            return Some(document);
        }
        Self::count_local(false);

        let document: Option<String> = self
            .remote_get(&CacheKey::Object(ObjectKey::ImageSitemap))
            .await;
        if let Some(document) = &document {
            self.objects.set_image_sitemap(document.clone());
        }
        document
    }

    pub async fn set_image_sitemap(&self, document: String) {
        if !self.object_reads_enabled() {
            return;
        }
        self.objects.set_image_sitemap(document.clone());
        self.remote_set(&CacheKey::Object(ObjectKey::ImageSitemap), &document)
            .await;
    }

    // ------------------------------------------------------------------
    // Responses
    // ------------------------------------------------------------------

    pub async fn get_response(&self, key: &ResponseKey) -> Option<CachedResponse> {
        if !self.config.enable_response_cache {
            return None;
        }
        if let Some(response) = self.responses.get(key) {
            Self::count_local(true);
            return Some(response);
        }
        Self::count_local(false);

        let cache_key = CacheKey::Response(key.clone());
        let response: Option<CachedResponse> = self.remote_get(&cache_key).await;
        if let Some(response) = &response {
            self.responses.set(key.clone(), response.clone());
        }
        response
    }

    /// Store a response in both tiers. Returns a locally evicted key, if
    /// any, so the caller can unregister it.
    pub async fn store_response(
        &self,
        key: ResponseKey,
        response: CachedResponse,
    ) -> Option<ResponseKey> {
        if !self.config.enable_response_cache {
            return None;
        }
        let evicted = self.responses.set(key.clone(), response.clone());
        self.remote_set(&CacheKey::Response(key), &response).await;
        evicted
    }

    // ------------------------------------------------------------------
    // Generic removal, used by the invalidation consumer
    // ------------------------------------------------------------------

    pub async fn remove(&self, key: &CacheKey) {
        match key {
            CacheKey::Object(object_key) => match object_key {
                ObjectKey::ArticleById(id) => {
                    // The paired slug entry is removed via its own key.
                    self.objects.invalidate_article(*id, "");
                }
                ObjectKey::ArticleBySlug(slug) => {
                    self.objects.invalidate_article(Uuid::nil(), slug);
                }
                ObjectKey::ProjectById(id) => self.objects.invalidate_project(*id),
                ObjectKey::ViewCount(slug) => self.objects.invalidate_view_count(slug),
                ObjectKey::ArticleList { page_hash } => {
                    self.objects.invalidate_article_list(*page_hash)
                }
                ObjectKey::ProjectList { page_hash } => {
                    self.objects.invalidate_project_list(*page_hash)
                }
                ObjectKey::Sitemap => self.objects.invalidate_sitemap(),
                ObjectKey::ImageSitemap => self.objects.invalidate_image_sitemap(),
            },
            CacheKey::Response(response_key) => self.responses.invalidate(response_key),
        }
        self.remote_delete(key).await;
    }

    /// Drop everything from the local tiers. Remote entries expire via TTL.
    pub fn clear_local(&self) {
        self.objects.clear();
        self.responses.invalidate_all();
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn local_only() -> CacheStore {
        CacheStore::new(CacheConfig::default(), None)
    }

    fn sample_article(slug: &str) -> ArticleRecord {
        ArticleRecord {
            id: Uuid::new_v4(),
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
    async fn falls_back_to_local_tier_without_remote() {
        let store = local_only();
        let article = sample_article("hello");
        let id = article.id;

        store.set_article(article).await;

        assert!(store.get_article_by_id(id).await.is_some());
        assert!(store.get_article_by_slug("hello").await.is_some());

        store.invalidate_article(id, "hello").await;
        assert!(store.get_article_by_id(id).await.is_none());
    }

    #[tokio::test]
    async fn disabled_object_cache_never_stores() {
        let config = CacheConfig {
            enable_object_cache: false,
            ..Default::default()
        };
        let store = CacheStore::new(config, None);
        let article = sample_article("hello");
        let id = article.id;

        store.set_article(article).await;
        assert!(store.get_article_by_id(id).await.is_none());
    }

    #[tokio::test]
    async fn generic_remove_covers_every_key_shape() {
        let store = local_only();

        store.set_sitemap("<urlset/>".to_string()).await;
        store.set_view_count("hello", 3).await;

        store.remove(&CacheKey::Object(ObjectKey::Sitemap)).await;
        store
            .remove(&CacheKey::Object(ObjectKey::ViewCount("hello".to_string())))
            .await;

        assert!(store.get_sitemap().await.is_none());
        assert!(store.get_view_count("hello").await.is_none());
    }

    #[tokio::test]
    async fn list_invalidation_drops_every_cached_page() {
        use crate::application::repos::PageRequest;

        let store = local_only();
        let page = OffsetPage::new(vec![sample_article("a")], PageRequest::default(), 1);
        store.set_article_list(1, page.clone()).await;
        store.set_article_list(2, page).await;

        store.invalidate_article_lists().await;

        assert!(store.get_article_list(1).await.is_none());
        assert!(store.get_article_list(2).await.is_none());
    }

    #[tokio::test]
    async fn response_cache_roundtrip_and_removal() {
        let store = local_only();
        let key = ResponseKey::Response {
            path: "/api/articles".to_string(),
            query_hash: 1,
        };
        let response = CachedResponse {
            status: 200,
            headers: vec![],
            body: b"{}".to_vec(),
        };

        store.store_response(key.clone(), response).await;
        assert!(store.get_response(&key).await.is_some());

        store.remove(&CacheKey::Response(key.clone())).await;
        assert!(store.get_response(&key).await.is_none());
    }

    #[test]
    fn remote_keys_are_distinct() {
        let keys = [
            CacheKey::Object(ObjectKey::ArticleBySlug("a".to_string())),
            CacheKey::Object(ObjectKey::ViewCount("a".to_string())),
            CacheKey::Object(ObjectKey::Sitemap),
            CacheKey::Object(ObjectKey::ImageSitemap),
            CacheKey::Response(ResponseKey::Response {
                path: "/a".to_string(),
                query_hash: 0,
            }),
        ];
        let rendered: std::collections::HashSet<_> = keys.iter().map(remote_key).collect();
        assert_eq!(rendered.len(), keys.len());
    }
}
