//! Admin project mutations.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{
    CreateProjectParams, OffsetPage, PageRequest, ProjectsRepo, ProjectsWriteRepo, RepoError,
    UpdateProjectParams,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::ProjectRecord;

#[derive(Debug, Error)]
pub enum ProjectAdminError {
    #[error("project not found")]
    NotFound,
    #[error("invalid project: {0}")]
    Invalid(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct ProjectCommand {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub technologies: String,
    pub github_link: Option<String>,
    pub live_demo_link: Option<String>,
}

#[derive(Clone)]
pub struct ProjectAdminService {
    projects: Arc<dyn ProjectsRepo>,
    writer: Arc<dyn ProjectsWriteRepo>,
    trigger: Option<Arc<CacheTrigger>>,
}

impl ProjectAdminService {
    pub fn new(
        projects: Arc<dyn ProjectsRepo>,
        writer: Arc<dyn ProjectsWriteRepo>,
        trigger: Option<Arc<CacheTrigger>>,
    ) -> Self {
        Self {
            projects,
            writer,
            trigger,
        }
    }

    pub async fn list(
        &self,
        page: PageRequest,
    ) -> Result<OffsetPage<ProjectRecord>, ProjectAdminError> {
        self.projects
            .list_projects(page)
            .await
            .map_err(ProjectAdminError::from)
    }

    pub async fn create(&self, command: ProjectCommand) -> Result<ProjectRecord, ProjectAdminError> {
        let params = validate(command)?;

        let record = self
            .writer
            .create_project(CreateProjectParams {
                title: params.title,
                description: params.description,
                image_url: params.image_url,
                technologies: params.technologies,
                github_link: params.github_link,
                live_demo_link: params.live_demo_link,
            })
            .await?;

        if let Some(trigger) = &self.trigger {
            trigger.project_upserted(record.id).await;
        }

        Ok(record)
    }

    pub async fn update(
        &self,
        id: Uuid,
        command: ProjectCommand,
    ) -> Result<ProjectRecord, ProjectAdminError> {
        let params = validate(command)?;

        let record = self
            .writer
            .update_project(UpdateProjectParams {
                id,
                title: params.title,
                description: params.description,
                image_url: params.image_url,
                technologies: params.technologies,
                github_link: params.github_link,
                live_demo_link: params.live_demo_link,
            })
            .await
            .map_err(map_not_found)?;

        if let Some(trigger) = &self.trigger {
            trigger.project_upserted(record.id).await;
        }

        Ok(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<ProjectRecord, ProjectAdminError> {
        let record = self.writer.delete_project(id).await.map_err(map_not_found)?;

        if let Some(trigger) = &self.trigger {
            trigger.project_deleted(record.id).await;
        }

        Ok(record)
    }
}

fn validate(command: ProjectCommand) -> Result<ProjectCommand, ProjectAdminError> {
    let title = command.title.trim().to_string();
    if title.is_empty() {
        return Err(ProjectAdminError::Invalid("title must not be empty".into()));
    }
    if command.description.trim().is_empty() {
        return Err(ProjectAdminError::Invalid(
            "description must not be empty".into(),
        ));
    }

    Ok(ProjectCommand { title, ..command })
}

fn map_not_found(err: RepoError) -> ProjectAdminError {
    match err {
        RepoError::NotFound => ProjectAdminError::NotFound,
        other => ProjectAdminError::Repo(other),
    }
}
