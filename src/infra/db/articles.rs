use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Row as _};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        ArticleScope, ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, OffsetPage,
        PageRequest, RepoError, UpdateArticleParams,
    },
    domain::entities::ArticleRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const ARTICLE_COLUMNS: &str =
    "id, slug, title, content, is_published, date_published, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    slug: String,
    title: String,
    content: String,
    is_published: bool,
    date_published: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            content: row.content,
            is_published: row.is_published,
            published_at: row.date_published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn push_scope_condition(qb: &mut QueryBuilder<'_, Postgres>, scope: ArticleScope) {
    if scope == ArticleScope::Public {
        qb.push(" AND is_published = TRUE AND date_published <= NOW()");
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn list_articles(
        &self,
        scope: ArticleScope,
        page: PageRequest,
    ) -> Result<OffsetPage<ArticleRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM articles WHERE 1=1");
        push_scope_condition(&mut count_qb, scope);
        let total: i64 = count_qb
            .build()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .try_get(0)
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE 1=1"));
        push_scope_condition(&mut qb, scope);
        qb.push(" ORDER BY date_published DESC NULLS LAST, created_at DESC");
        qb.push(" LIMIT ");
        qb.push_bind(page.per_page());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows: Vec<ArticleRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let items = rows.into_iter().map(ArticleRecord::from).collect();
        Ok(OffsetPage::new(items, page, total))
    }

    async fn get_article_by_slug(
        &self,
        scope: ArticleScope,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = "
        ));
        qb.push_bind(slug);
        push_scope_condition(&mut qb, scope);

        let row: Option<ArticleRow> = qb
            .build_query_as()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn get_article_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError> {
        let row: Option<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM articles WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_get(0).map_err(map_sqlx_error)
    }

    async fn list_published_slugs(&self) -> Result<Vec<ArticleRecord>, RepoError> {
        let rows: Vec<ArticleRow> = sqlx::query_as(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE is_published = TRUE AND date_published <= NOW() \
             ORDER BY date_published DESC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }
}

#[async_trait]
impl ArticlesWriteRepo for PostgresRepositories {
    async fn create_article(
        &self,
        params: CreateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let date_published = params.is_published.then(OffsetDateTime::now_utc);

        let row: ArticleRow = sqlx::query_as(&format!(
            "INSERT INTO articles (id, slug, title, content, is_published, date_published) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.slug)
        .bind(&params.title)
        .bind(&params.content)
        .bind(params.is_published)
        .bind(date_published)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_article(
        &self,
        params: UpdateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let row: ArticleRow = sqlx::query_as(&format!(
            "UPDATE articles SET title = $2, content = $3, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.content)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn set_article_published(
        &self,
        id: Uuid,
        is_published: bool,
    ) -> Result<ArticleRecord, RepoError> {
        // First publish stamps date_published; republish keeps the original instant.
        let row: ArticleRow = sqlx::query_as(&format!(
            "UPDATE articles SET \
                 is_published = $2, \
                 date_published = CASE \
                     WHEN $2 AND date_published IS NULL THEN NOW() \
                     ELSE date_published \
                 END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .bind(is_published)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_article(&self, id: Uuid) -> Result<ArticleRecord, RepoError> {
        let row: ArticleRow = sqlx::query_as(&format!(
            "DELETE FROM articles WHERE id = $1 RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }
}
