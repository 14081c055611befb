//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{ArticleRecord, ProjectRecord};

pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 24;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Offset pagination request, clamped to sane bounds at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        Self { page, per_page }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> OffsetPage<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + request.per_page() - 1) / request.per_page()
        };
        Self {
            items,
            page: request.page(),
            per_page: request.per_page(),
            total,
            total_pages,
        }
    }
}

/// Which articles a listing may see. Admin listings include drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleScope {
    Public,
    Admin,
}

#[derive(Debug, Clone)]
pub struct CreateArticleParams {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub is_published: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateArticleParams {
    pub id: Uuid,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CreateProjectParams {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub technologies: String,
    pub github_link: Option<String>,
    pub live_demo_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateProjectParams {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub technologies: String,
    pub github_link: Option<String>,
    pub live_demo_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordViewParams {
    pub article_slug: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn list_articles(
        &self,
        scope: ArticleScope,
        page: PageRequest,
    ) -> Result<OffsetPage<ArticleRecord>, RepoError>;

    async fn get_article_by_slug(
        &self,
        scope: ArticleScope,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, RepoError>;

    async fn get_article_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    /// All published slugs with their last-modified instants, for sitemaps.
    async fn list_published_slugs(&self) -> Result<Vec<ArticleRecord>, RepoError>;
}

#[async_trait]
pub trait ArticlesWriteRepo: Send + Sync {
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError>;

    async fn update_article(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError>;

    async fn set_article_published(
        &self,
        id: Uuid,
        is_published: bool,
    ) -> Result<ArticleRecord, RepoError>;

    async fn delete_article(&self, id: Uuid) -> Result<ArticleRecord, RepoError>;
}

#[async_trait]
pub trait ProjectsRepo: Send + Sync {
    async fn list_projects(&self, page: PageRequest) -> Result<OffsetPage<ProjectRecord>, RepoError>;

    async fn get_project(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError>;
}

#[async_trait]
pub trait ProjectsWriteRepo: Send + Sync {
    async fn create_project(&self, params: CreateProjectParams) -> Result<ProjectRecord, RepoError>;

    async fn update_project(&self, params: UpdateProjectParams) -> Result<ProjectRecord, RepoError>;

    async fn delete_project(&self, id: Uuid) -> Result<ProjectRecord, RepoError>;
}

#[async_trait]
pub trait ViewsRepo: Send + Sync {
    /// Insert a view unless (slug, ip) was already seen. Returns whether a
    /// new row was written.
    async fn record_view(&self, params: RecordViewParams) -> Result<bool, RepoError>;

    async fn count_views(&self, article_slug: &str) -> Result<i64, RepoError>;

    /// Drop all view rows for an article, used when the article is deleted.
    /// Returns how many rows were removed.
    async fn delete_views_for(&self, article_slug: &str) -> Result<u64, RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_defaults() {
        let request = PageRequest::default();
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), DEFAULT_PAGE_SIZE);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn page_request_clamps_bounds() {
        let request = PageRequest::new(Some(0), Some(1000));
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), MAX_PAGE_SIZE);

        let request = PageRequest::new(Some(3), Some(-5));
        assert_eq!(request.page(), 3);
        assert_eq!(request.per_page(), 1);
        assert_eq!(request.offset(), 2);
    }

    #[test]
    fn offset_page_computes_total_pages() {
        let request = PageRequest::new(Some(1), Some(6));
        let page = OffsetPage::<i32>::new(vec![], request, 13);
        assert_eq!(page.total_pages, 3);

        let empty = OffsetPage::<i32>::new(vec![], request, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
