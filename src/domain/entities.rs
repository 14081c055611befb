//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub is_published: bool,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub technologies: String,
    pub github_link: Option<String>,
    pub live_demo_link: Option<String>,
    pub date_added: OffsetDateTime,
}

impl ProjectRecord {
    /// Technologies are stored as a comma-separated string; split and trim
    /// for presentation.
    pub fn technology_list(&self) -> Vec<&str> {
        self.technologies
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleViewRecord {
    pub article_slug: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub viewed_at: OffsetDateTime,
}
