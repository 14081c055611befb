use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::application::{
    admin::{
        articles::{ArticleAdminError, ArticleAdminService, CreateArticleCommand, UpdateArticleCommand},
        projects::{ProjectAdminError, ProjectAdminService, ProjectCommand},
        session::{AuthError, SESSION_COOKIE, SessionStore},
    },
    error::HttpError,
    repos::PageRequest,
};

use super::{
    RouterState, success,
    middleware::{log_responses, set_request_context},
};

const SOURCE: &str = "infra::http::admin";

#[derive(Clone)]
pub struct AdminState {
    pub sessions: Arc<SessionStore>,
    pub articles: Arc<ArticleAdminService>,
    pub projects: Arc<ProjectAdminService>,
}

pub fn build_admin_router(state: RouterState) -> Router<RouterState> {
    let gate_state = state.admin.clone();

    let gated = Router::new()
        .route("/admin/logout", post(logout))
        .route(
            "/admin/articles",
            post(create_article).get(list_articles),
        )
        .route(
            "/admin/articles/{id}",
            put(update_article).delete(delete_article),
        )
        .route("/admin/articles/{id}/publish", post(publish_article))
        .route("/admin/articles/{id}/unpublish", post(unpublish_article))
        .route(
            "/admin/projects",
            post(create_project).get(list_projects),
        )
        .route(
            "/admin/projects/{id}",
            put(update_project).delete(delete_project),
        )
        .layer(middleware::from_fn_with_state(gate_state, require_session));

    Router::new()
        .route("/admin/login", post(login))
        .merge(gated)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Session gate for everything under /admin except login.
async fn require_session(
    State(state): State<AdminState>,
    jar: CookieJar,
    request: Request<Body>,
    next: middleware::Next,
) -> Response {
    let authorized = jar
        .get(SESSION_COOKIE)
        .map(|cookie| state.sessions.validate(cookie.value()))
        .unwrap_or(false);

    if !authorized {
        return HttpError::new(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            "missing or expired admin session",
        )
        .into_response();
    }

    next.run(request).await
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AdminState>,
    jar: CookieJar,
    axum::Json(body): axum::Json<LoginBody>,
) -> Response {
    let token = match state.sessions.login(&body.username, &body.password) {
        Ok(token) => token,
        Err(AuthError::InvalidCredentials) => {
            return HttpError::new(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                "Invalid credentials",
                "admin credential mismatch",
            )
            .into_response();
        }
        Err(AuthError::Disabled) => {
            return HttpError::new(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Admin login is disabled",
                "no admin password configured",
            )
            .into_response();
        }
    };

    let ttl = state.sessions.session_ttl();
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .build();

    (jar.add(cookie), success(json!({ "logged_in": true }))).into_response()
}

async fn logout(State(state): State<AdminState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.logout(cookie.value());
    }

    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (
        jar.remove(removal),
        success(json!({ "logged_in": false })),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ArticleBody {
    title: String,
    content: String,
    #[serde(default)]
    publish: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectBody {
    title: String,
    description: String,
    image_url: Option<String>,
    #[serde(default)]
    technologies: String,
    github_link: Option<String>,
    live_demo_link: Option<String>,
}

impl ProjectBody {
    fn into_command(self) -> ProjectCommand {
        ProjectCommand {
            title: self.title,
            description: self.description,
            image_url: self.image_url,
            technologies: self.technologies,
            github_link: self.github_link,
            live_demo_link: self.live_demo_link,
        }
    }
}

async fn list_articles(State(state): State<AdminState>, Query(query): Query<PageQuery>) -> Response {
    match state
        .articles
        .list(PageRequest::new(query.page, query.per_page))
        .await
    {
        Ok(page) => success(json!({
            "articles": page.items,
            "page": page.page,
            "per_page": page.per_page,
            "total": page.total,
            "total_pages": page.total_pages,
        }))
        .into_response(),
        Err(err) => article_error_to_http(err).into_response(),
    }
}

async fn create_article(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<ArticleBody>,
) -> Response {
    match state
        .articles
        .create(CreateArticleCommand {
            title: body.title,
            content: body.content,
            publish: body.publish,
        })
        .await
    {
        Ok(record) => (
            StatusCode::CREATED,
            success(json!({ "article": record })),
        )
            .into_response(),
        Err(err) => article_error_to_http(err).into_response(),
    }
}

async fn update_article(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<ArticleBody>,
) -> Response {
    match state
        .articles
        .update(UpdateArticleCommand {
            id,
            title: body.title,
            content: body.content,
        })
        .await
    {
        Ok(record) => success(json!({ "article": record })).into_response(),
        Err(err) => article_error_to_http(err).into_response(),
    }
}

async fn publish_article(State(state): State<AdminState>, Path(id): Path<Uuid>) -> Response {
    match state.articles.set_published(id, true).await {
        Ok(record) => success(json!({ "article": record })).into_response(),
        Err(err) => article_error_to_http(err).into_response(),
    }
}

async fn unpublish_article(State(state): State<AdminState>, Path(id): Path<Uuid>) -> Response {
    match state.articles.set_published(id, false).await {
        Ok(record) => success(json!({ "article": record })).into_response(),
        Err(err) => article_error_to_http(err).into_response(),
    }
}

async fn delete_article(State(state): State<AdminState>, Path(id): Path<Uuid>) -> Response {
    match state.articles.delete(id).await {
        Ok(record) => success(json!({ "deleted": record.id })).into_response(),
        Err(err) => article_error_to_http(err).into_response(),
    }
}

async fn list_projects(State(state): State<AdminState>, Query(query): Query<PageQuery>) -> Response {
    match state
        .projects
        .list(PageRequest::new(query.page, query.per_page))
        .await
    {
        Ok(page) => success(json!({
            "projects": page.items,
            "page": page.page,
            "per_page": page.per_page,
            "total": page.total,
            "total_pages": page.total_pages,
        }))
        .into_response(),
        Err(err) => project_error_to_http(err).into_response(),
    }
}

async fn create_project(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<ProjectBody>,
) -> Response {
    match state.projects.create(body.into_command()).await {
        Ok(record) => (
            StatusCode::CREATED,
            success(json!({ "project": record })),
        )
            .into_response(),
        Err(err) => project_error_to_http(err).into_response(),
    }
}

async fn update_project(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    axum::Json(body): axum::Json<ProjectBody>,
) -> Response {
    match state.projects.update(id, body.into_command()).await {
        Ok(record) => success(json!({ "project": record })).into_response(),
        Err(err) => project_error_to_http(err).into_response(),
    }
}

async fn delete_project(State(state): State<AdminState>, Path(id): Path<Uuid>) -> Response {
    match state.projects.delete(id).await {
        Ok(record) => success(json!({ "deleted": record.id })).into_response(),
        Err(err) => project_error_to_http(err).into_response(),
    }
}

fn article_error_to_http(err: ArticleAdminError) -> HttpError {
    match err {
        ArticleAdminError::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Article not found",
            "no article with that id",
        ),
        ArticleAdminError::Invalid(detail) => HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid article",
            detail,
        ),
        ArticleAdminError::Repo(repo) => HttpError::from(repo),
    }
}

fn project_error_to_http(err: ProjectAdminError) -> HttpError {
    match err {
        ProjectAdminError::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Project not found",
            "no project with that id",
        ),
        ProjectAdminError::Invalid(detail) => HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid project",
            detail,
        ),
        ProjectAdminError::Repo(repo) => HttpError::from(repo),
    }
}
