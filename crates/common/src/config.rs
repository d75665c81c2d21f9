use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Push provider send endpoint
    pub push_api_url: String,

    /// Bearer token for the push provider
    pub push_access_token: String,

    /// Endpoint probed by the health monitor (default: `push_api_url`)
    pub push_health_url: String,

    /// Device push token, if this instance already has one
    pub device_push_token: Option<String>,

    /// Delivery attempts before a notification is marked failed (default: 3)
    pub retry_max_attempts: u32,

    /// Retry queue drain interval in milliseconds (default: 60000)
    pub retry_interval_ms: u64,

    /// Health check interval in milliseconds (default: 300000)
    pub health_check_interval_ms: u64,

    /// Local cache → backend sync interval in milliseconds (default: 60000)
    pub sync_interval_ms: u64,

    /// Per-request timeout for push delivery in milliseconds (default: 10000)
    pub push_timeout_ms: u64,

    /// Immediate retries on push transport errors (default: 2)
    pub push_send_retries: u32,

    /// Base backoff between immediate push retries in milliseconds (default: 500)
    pub push_backoff_ms: u64,

    /// Directory holding the local notification cache
    pub cache_dir: PathBuf,

    /// HTTP port for the health/lifecycle API (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let push_api_url = std::env::var("PUSH_API_URL")
            .map_err(|_| anyhow::anyhow!("PUSH_API_URL environment variable is required"))?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            push_health_url: std::env::var("PUSH_HEALTH_URL")
                .unwrap_or_else(|_| push_api_url.clone()),
            push_api_url,
            push_access_token: std::env::var("PUSH_ACCESS_TOKEN")
                .map_err(|_| anyhow::anyhow!("PUSH_ACCESS_TOKEN environment variable is required"))?,
            device_push_token: std::env::var("DEVICE_PUSH_TOKEN").ok(),
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS", 3)?,
            retry_interval_ms: parse_var("RETRY_INTERVAL_MS", 60_000)?,
            health_check_interval_ms: parse_var("HEALTH_CHECK_INTERVAL_MS", 300_000)?,
            sync_interval_ms: parse_var("SYNC_INTERVAL_MS", 60_000)?,
            push_timeout_ms: parse_var("PUSH_TIMEOUT_MS", 10_000)?,
            push_send_retries: parse_var("PUSH_SEND_RETRIES", 2)?,
            push_backoff_ms: parse_var("PUSH_BACKOFF_MS", 500)?,
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./.herald-cache")),
            api_port: parse_var("API_PORT", 3000)?,
        })
    }
}

/// Read an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
