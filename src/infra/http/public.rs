use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, Request, StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::{
        articles::{ArticleQueryError, ArticleQueryService},
        error::HttpError,
        projects::{ProjectQueryError, ProjectQueryService},
        repos::{PageRequest, RecordViewParams},
        seo,
        sitemap::{SitemapError, SitemapService},
        views::ViewTracker,
    },
    cache::{CacheState, response_cache_layer},
    config::SiteSettings,
    infra::db::PostgresRepositories,
};

use super::{
    RouterState, db_health_response, success,
    middleware::{log_responses, set_request_context},
};

const SOURCE: &str = "infra::http::public";

#[derive(Clone)]
pub struct HttpState {
    pub articles: Arc<ArticleQueryService>,
    pub projects: Arc<ProjectQueryService>,
    pub views: Arc<ViewTracker>,
    pub sitemap: Arc<SitemapService>,
    pub site: SiteSettings,
    pub db: Arc<PostgresRepositories>,
    pub cache: Option<CacheState>,
}

pub fn build_router(state: RouterState) -> Router<RouterState> {
    let cached_routes = Router::new()
        .route("/", get(index))
        .route("/api/articles", get(list_articles))
        .route("/api/projects", get(list_projects))
        .route("/projects/{id}", get(project_detail))
        .route("/sitemap.xml", get(sitemap_xml))
        .route("/sitemap-images.xml", get(image_sitemap_xml));

    let cached_routes = apply_response_cache(cached_routes, &state);

    // View recording sits outside the response cache so a cache hit still
    // counts the visit.
    let article_route = Router::new().route("/blog/{slug}", get(article_detail));
    let article_route = apply_response_cache(article_route, &state);
    let article_route = article_route.layer(middleware::from_fn_with_state(
        state.http.clone(),
        record_article_view,
    ));

    let uncached_routes = Router::new()
        .route("/robots.txt", get(robots_txt))
        .route("/_health/db", get(public_health));

    cached_routes
        .merge(article_route)
        .merge(uncached_routes)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

fn apply_response_cache(
    router: Router<RouterState>,
    state: &RouterState,
) -> Router<RouterState> {
    match state.http.cache.clone() {
        Some(cache_state) => router.layer(middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        )),
        None => router,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

impl PageQuery {
    fn request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

async fn index(State(state): State<HttpState>) -> Response {
    let recent = match state.articles.list_published(PageRequest::default()).await {
        Ok(page) => page,
        Err(err) => return article_error_to_http(err).into_response(),
    };

    success(json!({
        "site": {
            "title": state.site.title,
            "description": state.site.description,
            "url": state.site.public_url.as_str(),
        },
        "recent_articles": recent.items,
    }))
    .into_response()
}

async fn list_articles(
    State(state): State<HttpState>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = match state.articles.list_published(query.request()).await {
        Ok(page) => page,
        Err(err) => return article_error_to_http(err).into_response(),
    };

    success(json!({
        "articles": page.items,
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
        "total_pages": page.total_pages,
        "has_more": page.page < page.total_pages,
    }))
    .into_response()
}

async fn article_detail(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    let detail = match state.articles.get_published(&slug).await {
        Ok(detail) => detail,
        Err(err) => return article_error_to_http(err).into_response(),
    };

    // Rebuild a record view of the payload for the metadata builders.
    let record = crate::domain::entities::ArticleRecord {
        id: detail.id,
        slug: detail.slug.clone(),
        title: detail.title.clone(),
        content: detail.content.clone(),
        is_published: true,
        published_at: detail.published_at,
        created_at: detail.updated_at,
        updated_at: detail.updated_at,
    };

    let meta = seo::og_meta(&state.site, &record);
    let json_ld = seo::blog_posting_json_ld(&state.site, &record);

    success(json!({
        "article": detail,
        "meta": meta,
        "json_ld": json_ld,
    }))
    .into_response()
}

/// Middleware on the article detail route: count the visit before the
/// response cache gets a chance to answer.
async fn record_article_view(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: axum::middleware::Next,
) -> Response {
    if let Some(slug) = request.uri().path().strip_prefix("/blog/") {
        let slug = slug.trim_end_matches('/').to_string();
        if !slug.is_empty() {
            let ip_address = client_ip(request.headers(), request.extensions().get());
            let user_agent = request
                .headers()
                .get("user-agent")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            state
                .views
                .track(RecordViewParams {
                    article_slug: slug,
                    ip_address,
                    user_agent,
                })
                .await;
        }
    }

    next.run(request).await
}

fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        let value = value.trim();
        if !value.is_empty() {
            return value.to_string();
        }
    }

    connect_info
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn list_projects(State(state): State<HttpState>, Query(query): Query<PageQuery>) -> Response {
    let page = match state.projects.list(query.request()).await {
        Ok(page) => page,
        Err(err) => return project_error_to_http(err).into_response(),
    };

    success(json!({
        "projects": page.items,
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
        "total_pages": page.total_pages,
        "has_more": page.page < page.total_pages,
    }))
    .into_response()
}

async fn project_detail(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    match state.projects.get(id).await {
        Ok(project) => success(json!({ "project": project })).into_response(),
        Err(err) => project_error_to_http(err).into_response(),
    }
}

async fn sitemap_xml(State(state): State<HttpState>) -> Response {
    match state.sitemap.sitemap_xml().await {
        Ok(xml) => xml_response(xml),
        Err(err) => sitemap_error_to_http(err).into_response(),
    }
}

async fn image_sitemap_xml(State(state): State<HttpState>) -> Response {
    match state.sitemap.image_sitemap_xml().await {
        Ok(xml) => xml_response(xml),
        Err(err) => sitemap_error_to_http(err).into_response(),
    }
}

async fn robots_txt(State(state): State<HttpState>) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.sitemap.robots_txt(),
    )
        .into_response()
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

fn xml_response(xml: String) -> Response {
    ([(CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response()
}

fn article_error_to_http(err: ArticleQueryError) -> HttpError {
    match err {
        ArticleQueryError::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Article not found",
            "no published article with that slug",
        ),
        ArticleQueryError::Repo(repo) => HttpError::from(repo),
    }
}

fn project_error_to_http(err: ProjectQueryError) -> HttpError {
    match err {
        ProjectQueryError::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Project not found",
            "no project with that id",
        ),
        ProjectQueryError::Repo(repo) => HttpError::from(repo),
    }
}

fn sitemap_error_to_http(err: SitemapError) -> HttpError {
    match err {
        SitemapError::Repo(repo) => HttpError::from(repo),
    }
}
