//! Role index reconciler runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use rolestore_application::{
    DEFAULT_ROLE_ARN_PREFIX, MetadataBackend, ReconcileOptions, RoleDirectory,
    RoleDirectoryConfig, RoleIndexReconciler,
};
use rolestore_core::{AppError, AppResult};
use rolestore_infrastructure::{PostgresMetadataBackend, RedisMetadataBackend};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Postgres,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Once,
    Migrate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BackendConfig {
    Postgres { database_url: String },
    Redis { redis_url: String, key_prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReconcilerConfig {
    backend: BackendConfig,
    arn_prefix: String,
    interval_ms: u64,
    remove_dangling: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = parse_command(env::args().nth(1).as_deref())?;
    let config = ReconcilerConfig::load()?;

    if command == Command::Migrate {
        let BackendConfig::Postgres { database_url } = &config.backend else {
            return Err(AppError::Validation(
                "migrate requires ROLESTORE_BACKEND=postgres".to_owned(),
            ));
        };
        let pool = connect_pool(database_url.as_str()).await?;
        return PostgresMetadataBackend::new(pool).run_migrations().await;
    }

    let backend = build_backend(&config.backend).await?;
    let directory = RoleDirectory::new(
        backend,
        RoleDirectoryConfig {
            arn_prefix: config.arn_prefix.clone(),
        },
    );
    let reconciler = RoleIndexReconciler::new(
        directory,
        ReconcileOptions {
            remove_dangling_pointers: config.remove_dangling,
        },
    );

    info!(
        backend = config.backend.kind_name(),
        interval_ms = config.interval_ms,
        remove_dangling = config.remove_dangling,
        "rolestore-reconciler started"
    );

    if command == Command::Once {
        let report = reconciler.run_pass().await?;
        if !report.is_clean() {
            warn!(?report, "reconciliation pass repaired or reported inconsistencies");
        }
        return Ok(());
    }

    loop {
        match reconciler.run_pass().await {
            Ok(report) if !report.is_clean() => {
                warn!(?report, "reconciliation pass repaired or reported inconsistencies");
            }
            Ok(_) => {}
            Err(error) => {
                warn!(error = %error, "reconciliation pass failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(config.interval_ms)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn build_backend(config: &BackendConfig) -> AppResult<Arc<dyn MetadataBackend>> {
    match config {
        BackendConfig::Postgres { database_url } => {
            let pool = connect_pool(database_url.as_str()).await?;
            Ok(Arc::new(PostgresMetadataBackend::new(pool)))
        }
        BackendConfig::Redis {
            redis_url,
            key_prefix,
        } => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Internal(format!("failed to build Redis client: {error}"))
            })?;
            Ok(Arc::new(RedisMetadataBackend::new(
                client,
                key_prefix.as_str(),
            )))
        }
    }
}

fn parse_command(argument: Option<&str>) -> AppResult<Command> {
    match argument {
        None => Ok(Command::Run),
        Some("once") => Ok(Command::Once),
        Some("migrate") => Ok(Command::Migrate),
        Some(other) => Err(AppError::Validation(format!(
            "unknown command '{other}', expected 'once' or 'migrate'"
        ))),
    }
}

impl BackendConfig {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Redis { .. } => "redis",
        }
    }
}

impl ReconcilerConfig {
    fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let backend = match lookup("ROLESTORE_BACKEND")
            .map(|value| value.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("postgres") => BackendKind::Postgres,
            Some("redis") => BackendKind::Redis,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "invalid ROLESTORE_BACKEND value '{other}', expected 'postgres' or 'redis'"
                )));
            }
        };

        let backend = match backend {
            BackendKind::Postgres => BackendConfig::Postgres {
                database_url: required_env(&lookup, "DATABASE_URL")?,
            },
            BackendKind::Redis => BackendConfig::Redis {
                redis_url: required_env(&lookup, "REDIS_URL")?,
                key_prefix: lookup("REDIS_KEY_PREFIX")
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| "rolestore".to_owned()),
            },
        };

        let arn_prefix = lookup("ROLE_ARN_PREFIX")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_ARN_PREFIX.to_owned());
        let interval_ms = parse_env_u64(&lookup, "RECONCILE_INTERVAL_MS", 60_000)?;
        let remove_dangling = parse_env_bool(&lookup, "RECONCILE_REMOVE_DANGLING", false)?;

        if interval_ms == 0 {
            return Err(AppError::Validation(
                "RECONCILE_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            backend,
            arn_prefix,
            interval_ms,
            remove_dangling,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> AppResult<u64> {
    match lookup(name) {
        Some(value) => value.trim().parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> AppResult<bool> {
    match lookup(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(AppError::Validation(format!(
                "invalid {name} value '{value}', expected true or false"
            ))),
        },
        None => Ok(default),
    }
}
