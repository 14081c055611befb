use async_trait::async_trait;
use sqlx::Row as _;

use crate::application::repos::{RecordViewParams, RepoError, ViewsRepo};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl ViewsRepo for PostgresRepositories {
    async fn record_view(&self, params: RecordViewParams) -> Result<bool, RepoError> {
        // One row per (slug, ip) pair forever; repeat visits are not re-counted.
        let result = sqlx::query(
            "INSERT INTO article_views (article_slug, ip_address, user_agent) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (article_slug, ip_address) DO NOTHING",
        )
        .bind(&params.article_slug)
        .bind(&params.ip_address)
        .bind(&params.user_agent)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_views(&self, article_slug: &str) -> Result<i64, RepoError> {
        let row = sqlx::query("SELECT COUNT(*) FROM article_views WHERE article_slug = $1")
            .bind(article_slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_get(0).map_err(map_sqlx_error)
    }

    async fn delete_views_for(&self, article_slug: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM article_views WHERE article_slug = $1")
            .bind(article_slug)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
