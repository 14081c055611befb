use std::{net::SocketAddr, process, sync::Arc, time::Duration};

use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vetrina::{
    application::{
        admin::{
            articles::ArticleAdminService, projects::ProjectAdminService, session::SessionStore,
        },
        articles::ArticleQueryService,
        error::AppError,
        projects::ProjectQueryService,
        repos::{ArticlesRepo, ArticlesWriteRepo, ProjectsRepo, ProjectsWriteRepo, ViewsRepo},
        sitemap::SitemapService,
        views::ViewTracker,
    },
    cache::{
        CacheConfig, CacheConsumer, CacheRegistry, CacheState, CacheStore, CacheTrigger,
        EventQueue, RemoteCache, WarmSources,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState, RouterState},
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    info!(target = "vetrina::migrate", "migrations applied");
    drop(repositories);
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings).await?;

    // Queue a warmup event so the first requests hit a primed cache.
    if let Some(trigger) = &app.cache_trigger {
        trigger.warmup_on_startup().await;
    }

    let cache_handle = app.cache_trigger.clone().map(|trigger| {
        let interval_ms = trigger.config().auto_consume_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                trigger.consumer().consume().await;
            }
        })
    });

    let result = serve_http(&settings, app.http_state, app.admin_state).await;

    if let Some(handle) = cache_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
    cache_trigger: Option<Arc<CacheTrigger>>,
}

async fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let articles_repo: Arc<dyn ArticlesRepo> = repositories.clone();
    let articles_write_repo: Arc<dyn ArticlesWriteRepo> = repositories.clone();
    let projects_repo: Arc<dyn ProjectsRepo> = repositories.clone();
    let projects_write_repo: Arc<dyn ProjectsWriteRepo> = repositories.clone();
    let views_repo: Arc<dyn ViewsRepo> = repositories.clone();

    let cache_config = CacheConfig::from(&settings.cache);
    let (cache_store, cache_trigger, cache_state) = if cache_config.is_enabled() {
        let remote = connect_remote_cache(settings, &cache_config).await;
        let store = Arc::new(CacheStore::new(cache_config.clone(), remote));
        let registry = Arc::new(CacheRegistry::new());
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(
            cache_config.clone(),
            store.clone(),
            registry.clone(),
            queue.clone(),
            WarmSources {
                articles: articles_repo.clone(),
                projects: projects_repo.clone(),
                views: views_repo.clone(),
            },
        ));
        let trigger = Arc::new(CacheTrigger::new(cache_config.clone(), queue, consumer));
        let state = CacheState {
            config: cache_config,
            store: store.clone(),
            registry,
        };
        (Some(store), Some(trigger), Some(state))
    } else {
        (None, None, None)
    };

    let article_query = Arc::new(ArticleQueryService::new(
        articles_repo.clone(),
        views_repo.clone(),
        cache_store.clone(),
    ));
    let project_query = Arc::new(ProjectQueryService::new(
        projects_repo.clone(),
        cache_store.clone(),
    ));
    let view_tracker = Arc::new(ViewTracker::new(
        views_repo.clone(),
        cache_trigger.clone(),
    ));
    let sitemap_service = Arc::new(SitemapService::new(
        articles_repo.clone(),
        settings.site.clone(),
        cache_store.clone(),
    ));

    let http_state = HttpState {
        articles: article_query,
        projects: project_query,
        views: view_tracker,
        sitemap: sitemap_service,
        site: settings.site.clone(),
        db: repositories.clone(),
        cache: cache_state,
    };

    let admin_state = AdminState {
        sessions: SessionStore::new(settings.admin.clone()),
        articles: Arc::new(ArticleAdminService::new(
            articles_repo,
            articles_write_repo,
            views_repo,
            cache_trigger.clone(),
        )),
        projects: Arc::new(ProjectAdminService::new(
            projects_repo,
            projects_write_repo,
            cache_trigger.clone(),
        )),
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
        cache_trigger,
    })
}

/// Attach the remote tier when a Redis URL is configured. A connection
/// failure at startup demotes the service to local-only caching instead of
/// aborting.
async fn connect_remote_cache(
    settings: &config::Settings,
    cache_config: &CacheConfig,
) -> Option<RemoteCache> {
    let url = settings.redis.url.as_ref()?;

    match RemoteCache::connect(
        url,
        settings.redis.key_prefix.clone(),
        cache_config.remote_op_timeout(),
        cache_config.remote_entry_ttl_secs,
        cache_config.remote_failure_threshold,
        cache_config.remote_retry_cooldown(),
    )
    .await
    {
        Ok(remote) => {
            info!(target = "vetrina::cache", "remote cache connected");
            Some(remote)
        }
        Err(err) => {
            warn!(
                target = "vetrina::cache",
                error = %err,
                "remote cache unavailable, continuing with in-process tier only",
            );
            None
        }
    }
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let router_state = RouterState {
        http: http_state,
        admin: admin_state,
    };
    let router = http::build_router(router_state.clone())
        .merge(http::build_admin_router(router_state.clone()))
        .with_state(router_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "vetrina::http",
        addr = %settings.server.addr,
        "listening",
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
    .await
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(
        target = "vetrina::http",
        grace_seconds = grace.as_secs(),
        "shutdown signal received",
    );
}
