use async_trait::async_trait;
use sqlx::Row as _;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreateProjectParams, OffsetPage, PageRequest, ProjectsRepo, ProjectsWriteRepo, RepoError,
        UpdateProjectParams,
    },
    domain::entities::ProjectRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const PROJECT_COLUMNS: &str =
    "id, title, description, image_url, technologies, github_link, live_demo_link, date_added";

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    title: String,
    description: String,
    image_url: Option<String>,
    technologies: String,
    github_link: Option<String>,
    live_demo_link: Option<String>,
    date_added: OffsetDateTime,
}

impl From<ProjectRow> for ProjectRecord {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            technologies: row.technologies,
            github_link: row.github_link,
            live_demo_link: row.live_demo_link,
            date_added: row.date_added,
        }
    }
}

#[async_trait]
impl ProjectsRepo for PostgresRepositories {
    async fn list_projects(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ProjectRecord>, RepoError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) FROM projects")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .try_get(0)
            .map_err(map_sqlx_error)?;

        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             ORDER BY date_added DESC \
             LIMIT $1 OFFSET $2"
        ))
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let items = rows.into_iter().map(ProjectRecord::from).collect();
        Ok(OffsetPage::new(items, page, total))
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProjectRecord::from))
    }
}

#[async_trait]
impl ProjectsWriteRepo for PostgresRepositories {
    async fn create_project(
        &self,
        params: CreateProjectParams,
    ) -> Result<ProjectRecord, RepoError> {
        let row: ProjectRow = sqlx::query_as(&format!(
            "INSERT INTO projects \
                 (id, title, description, image_url, technologies, github_link, live_demo_link) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.title)
        .bind(&params.description)
        .bind(&params.image_url)
        .bind(&params.technologies)
        .bind(&params.github_link)
        .bind(&params.live_demo_link)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_project(
        &self,
        params: UpdateProjectParams,
    ) -> Result<ProjectRecord, RepoError> {
        let row: ProjectRow = sqlx::query_as(&format!(
            "UPDATE projects SET \
                 title = $2, description = $3, image_url = $4, \
                 technologies = $5, github_link = $6, live_demo_link = $7 \
             WHERE id = $1 \
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.description)
        .bind(&params.image_url)
        .bind(&params.technologies)
        .bind(&params.github_link)
        .bind(&params.live_demo_link)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_project(&self, id: Uuid) -> Result<ProjectRecord, RepoError> {
        let row: ProjectRow = sqlx::query_as(&format!(
            "DELETE FROM projects WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }
}
