//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, sync::Arc, time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vetrina";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_REDIS_KEY_PREFIX: &str = "vetrina";
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;
const DEFAULT_SITE_URL: &str = "http://localhost:3000";
const DEFAULT_SITE_TITLE: &str = "Vetrina";
const DEFAULT_SITE_DESCRIPTION: &str = "Personal blog and project portfolio";
const DEFAULT_SITE_SOCIAL_IMAGE: &str = "/static/social-card.jpg";

/// Command-line arguments for the Vetrina binary.
#[derive(Debug, Parser)]
#[command(name = "vetrina", version, about = "Vetrina portfolio server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "VETRINA_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Vetrina HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    #[command(name = "migrate")]
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the Redis connection URL for the remote cache tier.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the public site URL used in sitemaps and canonical links.
    #[arg(long = "site-url", value_name = "URL")]
    pub site_url: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub admin: AdminSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// Remote cache connection URL. When unset the service runs on the
    /// in-process tier alone.
    pub url: Option<String>,
    pub key_prefix: String,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    pub username: String,
    /// When unset, admin login is disabled and every login attempt fails.
    pub password: Option<Arc<str>>,
    pub session_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub public_url: Url,
    pub title: String,
    pub description: String,
    /// Byline for JSON-LD author/publisher entries. Defaults to the site title.
    pub author: String,
    /// Site-relative path of the fallback social card image.
    pub social_image: String,
}

/// Resolved cache settings, consumed by the cache layer.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enable_object_cache: bool,
    pub enable_response_cache: bool,
    pub article_limit: usize,
    pub project_limit: usize,
    pub list_limit: usize,
    pub view_count_limit: usize,
    pub response_limit: usize,
    pub auto_consume_interval_ms: u64,
    pub consume_batch_limit: usize,
    pub remote_op_timeout_ms: u64,
    pub remote_entry_ttl_secs: u64,
    pub remote_failure_threshold: u32,
    pub remote_retry_cooldown_ms: u64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VETRINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    admin: RawAdminSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(url) = overrides.site_url.as_ref() {
            self.site.public_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            redis,
            admin,
            site,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let redis = build_redis_settings(redis)?;
        let admin = build_admin_settings(admin)?;
        let site = build_site_settings(site)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            logging,
            database,
            redis,
            admin,
            site,
            cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .map(normalize_database_url);

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = redis.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let key_prefix = redis
        .key_prefix
        .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_string());
    if key_prefix.trim().is_empty() {
        return Err(LoadError::invalid(
            "redis.key_prefix",
            "prefix must not be empty",
        ));
    }

    Ok(RedisSettings { url, key_prefix })
}

fn build_admin_settings(admin: RawAdminSettings) -> Result<AdminSettings, LoadError> {
    let username = admin
        .username
        .unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.to_string());
    if username.trim().is_empty() {
        return Err(LoadError::invalid(
            "admin.username",
            "username must not be empty",
        ));
    }

    let password = match admin.password {
        Some(value) if value.is_empty() => {
            return Err(LoadError::invalid(
                "admin.password",
                "password must not be empty when set",
            ));
        }
        Some(value) => Some(Arc::<str>::from(value)),
        None => None,
    };

    let ttl_secs = admin
        .session_ttl_seconds
        .unwrap_or(DEFAULT_SESSION_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "admin.session_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(AdminSettings {
        username,
        password,
        session_ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let url_value = site
        .public_url
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let public_url = Url::parse(url_value.trim())
        .map_err(|err| LoadError::invalid("site.public_url", format!("failed to parse: {err}")))?;

    let title = site
        .title
        .unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string());
    let description = site
        .description
        .unwrap_or_else(|| DEFAULT_SITE_DESCRIPTION.to_string());
    let author = site.author.unwrap_or_else(|| title.clone());
    let social_image = site
        .social_image
        .unwrap_or_else(|| DEFAULT_SITE_SOCIAL_IMAGE.to_string());

    Ok(SiteSettings {
        public_url,
        title,
        description,
        author,
        social_image,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let base = crate::cache::CacheConfig::default();

    let settings = CacheSettings {
        enable_object_cache: cache.enable_object_cache.unwrap_or(base.enable_object_cache),
        enable_response_cache: cache
            .enable_response_cache
            .unwrap_or(base.enable_response_cache),
        article_limit: cache.article_limit.unwrap_or(base.article_limit),
        project_limit: cache.project_limit.unwrap_or(base.project_limit),
        list_limit: cache.list_limit.unwrap_or(base.list_limit),
        view_count_limit: cache.view_count_limit.unwrap_or(base.view_count_limit),
        response_limit: cache.response_limit.unwrap_or(base.response_limit),
        auto_consume_interval_ms: cache
            .auto_consume_interval_ms
            .unwrap_or(base.auto_consume_interval_ms),
        consume_batch_limit: cache
            .consume_batch_limit
            .unwrap_or(base.consume_batch_limit),
        remote_op_timeout_ms: cache
            .remote_op_timeout_ms
            .unwrap_or(base.remote_op_timeout_ms),
        remote_entry_ttl_secs: cache
            .remote_entry_ttl_secs
            .unwrap_or(base.remote_entry_ttl_secs),
        remote_failure_threshold: cache
            .remote_failure_threshold
            .unwrap_or(base.remote_failure_threshold),
        remote_retry_cooldown_ms: cache
            .remote_retry_cooldown_ms
            .unwrap_or(base.remote_retry_cooldown_ms),
    };

    if settings.consume_batch_limit == 0 {
        return Err(LoadError::invalid(
            "cache.consume_batch_limit",
            "must be greater than zero",
        ));
    }
    if settings.remote_op_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.remote_op_timeout_ms",
            "must be greater than zero",
        ));
    }
    if settings.remote_entry_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.remote_entry_ttl_secs",
            "must be greater than zero",
        ));
    }

    Ok(settings)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
    key_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    username: Option<String>,
    password: Option<String>,
    session_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    public_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    author: Option<String>,
    social_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_object_cache: Option<bool>,
    enable_response_cache: Option<bool>,
    article_limit: Option<usize>,
    project_limit: Option<usize>,
    list_limit: Option<usize>,
    view_count_limit: Option<usize>,
    response_limit: Option<usize>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<usize>,
    remote_op_timeout_ms: Option<u64>,
    remote_entry_ttl_secs: Option<u64>,
    remote_failure_threshold: Option<u32>,
    remote_retry_cooldown_ms: Option<u64>,
}

/// Both `postgres://` and `postgresql://` are accepted in the wild; sqlx
/// wants the short scheme.
fn normalize_database_url(url: String) -> String {
    match url.strip_prefix("postgresql://") {
        Some(rest) => format!("postgres://{rest}"),
        None => url,
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn defaults_resolve_without_any_input() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.database.max_connections.get(), 8);
        assert!(settings.redis.url.is_none());
        assert_eq!(settings.redis.key_prefix, DEFAULT_REDIS_KEY_PREFIX);
        assert!(settings.admin.password.is_none());
        assert_eq!(settings.site.public_url.as_str(), "http://localhost:3000/");
        assert!(settings.cache.enable_object_cache);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero port");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "server.port"));
    }

    #[test]
    fn empty_admin_password_is_rejected() {
        let mut raw = RawSettings::default();
        raw.admin.password = Some(String::new());
        let err = Settings::from_raw(raw).expect_err("empty password");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "admin.password"));
    }

    #[test]
    fn postgresql_scheme_is_normalized() {
        let mut raw = RawSettings::default();
        raw.database.url = Some("postgresql://user@host/db".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(
            settings.database.url.as_deref(),
            Some("postgres://user@host/db")
        );
    }

    #[test]
    fn site_author_falls_back_to_title() {
        let mut raw = RawSettings::default();
        raw.site.title = Some("My Corner".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.site.author, "My Corner");
        assert_eq!(settings.site.social_image, DEFAULT_SITE_SOCIAL_IMAGE);
    }

    #[test]
    fn malformed_site_url_is_rejected() {
        let mut raw = RawSettings::default();
        raw.site.public_url = Some("not a url".to_string());
        let err = Settings::from_raw(raw).expect_err("bad url");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "site.public_url"));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["vetrina"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "vetrina",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--database-url",
            "postgres://override",
            "--redis-url",
            "redis://localhost:6379",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
                assert_eq!(
                    serve.overrides.redis_url.as_deref(),
                    Some("redis://localhost:6379")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_migrate_arguments() {
        let args = CliArgs::parse_from([
            "vetrina",
            "migrate",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("migrate command") {
            Command::Migrate(migrate) => {
                assert_eq!(
                    migrate.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
