//! Public article reads with cache read-through.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ArticleScope, ArticlesRepo, OffsetPage, PageRequest, RepoError, ViewsRepo,
};
use crate::cache::{CacheStore, EntityKey, deps, hash_page_request};
use crate::domain::content;
use crate::domain::entities::ArticleRecord;

#[derive(Debug, Clone, Serialize)]
pub struct ArticleSummary {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub reading_time_minutes: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleDetail {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub reading_time_minutes: usize,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ArticleSummary {
    pub fn from_record(record: &ArticleRecord) -> Self {
        Self {
            id: record.id,
            slug: record.slug.clone(),
            title: record.title.clone(),
            summary: content::summarize(&record.content),
            reading_time_minutes: content::reading_time_minutes(&record.content),
            published_at: record.published_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArticleQueryError {
    #[error("article not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Read path for the public article surface. Consults the cache before the
/// repository and registers entity dependencies for response invalidation.
#[derive(Clone)]
pub struct ArticleQueryService {
    articles: Arc<dyn ArticlesRepo>,
    views: Arc<dyn ViewsRepo>,
    cache: Option<Arc<CacheStore>>,
}

impl ArticleQueryService {
    pub fn new(
        articles: Arc<dyn ArticlesRepo>,
        views: Arc<dyn ViewsRepo>,
        cache: Option<Arc<CacheStore>>,
    ) -> Self {
        Self {
            articles,
            views,
            cache,
        }
    }

    pub async fn list_published(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ArticleSummary>, ArticleQueryError> {
        deps::record(EntityKey::ArticlesIndex);

        let records = self.load_page(page).await?;
        let items = records
            .items
            .iter()
            .map(ArticleSummary::from_record)
            .collect();

        Ok(OffsetPage {
            items,
            page: records.page,
            per_page: records.per_page,
            total: records.total,
            total_pages: records.total_pages,
        })
    }

    async fn load_page(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ArticleRecord>, ArticleQueryError> {
        let page_hash = hash_page_request(&page);

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_article_list(page_hash).await
        {
            return Ok(cached);
        }

        let records = self
            .articles
            .list_articles(ArticleScope::Public, page)
            .await?;

        if let Some(cache) = &self.cache {
            cache.set_article_list(page_hash, records.clone()).await;
        }

        Ok(records)
    }

    /// Resolve a published article by slug. Drafts are invisible here.
    pub async fn get_published(&self, slug: &str) -> Result<ArticleDetail, ArticleQueryError> {
        let record = self.load_by_slug(slug).await?;

        deps::record(EntityKey::Article(record.id));
        deps::record(EntityKey::ArticleSlug(record.slug.clone()));
        deps::record(EntityKey::ArticleViews(record.slug.clone()));

        let views = self.load_view_count(&record.slug).await?;

        Ok(ArticleDetail {
            id: record.id,
            slug: record.slug.clone(),
            title: record.title.clone(),
            summary: content::summarize(&record.content),
            reading_time_minutes: content::reading_time_minutes(&record.content),
            content: record.content,
            views,
            published_at: record.published_at,
            updated_at: record.updated_at,
        })
    }

    async fn load_by_slug(&self, slug: &str) -> Result<ArticleRecord, ArticleQueryError> {
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_article_by_slug(slug).await
        {
            // The cache holds admin-scope records; drafts stay hidden.
            if cached.is_published {
                return Ok(cached);
            }
            return Err(ArticleQueryError::NotFound);
        }

        let record = self
            .articles
            .get_article_by_slug(ArticleScope::Public, slug)
            .await?
            .ok_or(ArticleQueryError::NotFound)?;

        if let Some(cache) = &self.cache {
            cache.set_article(record.clone()).await;
        }

        Ok(record)
    }

    async fn load_view_count(&self, slug: &str) -> Result<i64, ArticleQueryError> {
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_view_count(slug).await
        {
            return Ok(cached);
        }

        let count = self.views.count_views(slug).await?;

        if let Some(cache) = &self.cache {
            cache.set_view_count(slug, count).await;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slug: &str, published: bool) -> ArticleRecord {
        let now = OffsetDateTime::now_utc();
        ArticleRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: "A title".to_string(),
            content: "<p>Some body text for the article.</p>".to_string(),
            is_published: published,
            published_at: published.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn summary_projection_strips_markup() {
        let summary = ArticleSummary::from_record(&record("a-title", true));
        assert_eq!(summary.slug, "a-title");
        assert!(!summary.summary.contains('<'));
        assert_eq!(summary.reading_time_minutes, 1);
    }
}
