//! Public project reads with cache read-through.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{OffsetPage, PageRequest, ProjectsRepo, RepoError};
use crate::cache::{CacheStore, EntityKey, deps, hash_page_request};
use crate::domain::entities::ProjectRecord;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub technologies: Vec<String>,
    pub github_link: Option<String>,
    pub live_demo_link: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,
}

impl ProjectView {
    pub fn from_record(record: &ProjectRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            image_url: record.image_url.clone(),
            technologies: record
                .technology_list()
                .into_iter()
                .map(str::to_string)
                .collect(),
            github_link: record.github_link.clone(),
            live_demo_link: record.live_demo_link.clone(),
            date_added: record.date_added,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectQueryError {
    #[error("project not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct ProjectQueryService {
    projects: Arc<dyn ProjectsRepo>,
    cache: Option<Arc<CacheStore>>,
}

impl ProjectQueryService {
    pub fn new(projects: Arc<dyn ProjectsRepo>, cache: Option<Arc<CacheStore>>) -> Self {
        Self { projects, cache }
    }

    pub async fn list(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ProjectView>, ProjectQueryError> {
        deps::record(EntityKey::ProjectsIndex);

        let records = self.load_page(page).await?;
        let items = records.items.iter().map(ProjectView::from_record).collect();

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
    ) -> Result<OffsetPage<ProjectRecord>, ProjectQueryError> {
        let page_hash = hash_page_request(&page);

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_project_list(page_hash).await
        {
            return Ok(cached);
        }

        let records = self.projects.list_projects(page).await?;

        if let Some(cache) = &self.cache {
            cache.set_project_list(page_hash, records.clone()).await;
        }

        Ok(records)
    }

    pub async fn get(&self, id: Uuid) -> Result<ProjectView, ProjectQueryError> {
        deps::record(EntityKey::Project(id));

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get_project(id).await
        {
            return Ok(ProjectView::from_record(&cached));
        }

        let record = self
            .projects
            .get_project(id)
            .await?
            .ok_or(ProjectQueryError::NotFound)?;

        if let Some(cache) = &self.cache {
            cache.set_project(record.clone()).await;
        }

        Ok(ProjectView::from_record(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_projection_splits_technologies() {
        let record = ProjectRecord {
            id: Uuid::new_v4(),
            title: "Demo".to_string(),
            description: "A demo project".to_string(),
            image_url: None,
            technologies: "Rust, Axum , Postgres".to_string(),
            github_link: None,
            live_demo_link: None,
            date_added: OffsetDateTime::now_utc(),
        };

        let view = ProjectView::from_record(&record);
        assert_eq!(view.technologies, vec!["Rust", "Axum", "Postgres"]);
    }
}
