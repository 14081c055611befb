//! Admin article mutations.
//!
//! Slugs are derived once at creation and never change afterwards, so
//! published URLs stay stable across edits.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{
    ArticleScope, ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, OffsetPage, PageRequest,
    RepoError, UpdateArticleParams, ViewsRepo,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::ArticleRecord;
use crate::domain::slug::{SlugAsyncError, generate_unique_slug_async};

#[derive(Debug, Error)]
pub enum ArticleAdminError {
    #[error("article not found")]
    NotFound,
    #[error("invalid article: {0}")]
    Invalid(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for ArticleAdminError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Predicate(repo) => ArticleAdminError::Repo(repo),
            SlugAsyncError::Slug(slug) => ArticleAdminError::Invalid(slug.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateArticleCommand {
    pub title: String,
    pub content: String,
    pub publish: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateArticleCommand {
    pub id: Uuid,
    pub title: String,
    pub content: String,
}

#[derive(Clone)]
pub struct ArticleAdminService {
    articles: Arc<dyn ArticlesRepo>,
    writer: Arc<dyn ArticlesWriteRepo>,
    views: Arc<dyn ViewsRepo>,
    trigger: Option<Arc<CacheTrigger>>,
}

impl ArticleAdminService {
    pub fn new(
        articles: Arc<dyn ArticlesRepo>,
        writer: Arc<dyn ArticlesWriteRepo>,
        views: Arc<dyn ViewsRepo>,
        trigger: Option<Arc<CacheTrigger>>,
    ) -> Self {
        Self {
            articles,
            writer,
            views,
            trigger,
        }
    }

    /// Admin listing, drafts included.
    pub async fn list(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ArticleRecord>, ArticleAdminError> {
        self.articles
            .list_articles(ArticleScope::Admin, page)
            .await
            .map_err(ArticleAdminError::from)
    }

    pub async fn create(
        &self,
        command: CreateArticleCommand,
    ) -> Result<ArticleRecord, ArticleAdminError> {
        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(ArticleAdminError::Invalid("title must not be empty".into()));
        }
        if command.content.trim().is_empty() {
            return Err(ArticleAdminError::Invalid(
                "content must not be empty".into(),
            ));
        }

        let slug = generate_unique_slug_async(&title, |candidate: &str| {
            let articles = self.articles.clone();
            let candidate = candidate.to_string();
            async move { articles.slug_exists(&candidate).await.map(|exists| !exists) }
        })
        .await?;

        let record = self
            .writer
            .create_article(CreateArticleParams {
                slug,
                title,
                content: command.content,
                is_published: command.publish,
            })
            .await?;

        if let Some(trigger) = &self.trigger {
            trigger.article_upserted(record.id, &record.slug).await;
        }

        Ok(record)
    }

    pub async fn update(
        &self,
        command: UpdateArticleCommand,
    ) -> Result<ArticleRecord, ArticleAdminError> {
        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(ArticleAdminError::Invalid("title must not be empty".into()));
        }

        let record = self
            .writer
            .update_article(UpdateArticleParams {
                id: command.id,
                title,
                content: command.content,
            })
            .await
            .map_err(map_not_found)?;

        if let Some(trigger) = &self.trigger {
            trigger.article_upserted(record.id, &record.slug).await;
        }

        Ok(record)
    }

    pub async fn set_published(
        &self,
        id: Uuid,
        is_published: bool,
    ) -> Result<ArticleRecord, ArticleAdminError> {
        let record = self
            .writer
            .set_article_published(id, is_published)
            .await
            .map_err(map_not_found)?;

        if let Some(trigger) = &self.trigger {
            trigger.article_upserted(record.id, &record.slug).await;
        }

        Ok(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<ArticleRecord, ArticleAdminError> {
        let record = self.writer.delete_article(id).await.map_err(map_not_found)?;

        // The article is gone either way; orphaned view rows are only noise.
        if let Err(err) = self.views.delete_views_for(&record.slug).await {
            warn!(slug = %record.slug, error = %err, "failed to drop view rows for deleted article");
        }

        if let Some(trigger) = &self.trigger {
            trigger.article_deleted(record.id, &record.slug).await;
        }

        Ok(record)
    }
}

fn map_not_found(err: RepoError) -> ArticleAdminError {
    match err {
        RepoError::NotFound => ArticleAdminError::NotFound,
        other => ArticleAdminError::Repo(other),
    }
}
