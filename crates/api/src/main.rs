//! Herald notification service binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_cache::FileStore;
use herald_common::backend::{BackendStore, PgBackend};
use herald_common::config::AppConfig;
use herald_common::db::{create_pool, migrate};
use herald_common::retry::TimeoutPolicy;
use herald_common::token::StaticTokenSource;
use herald_engine::{NotificationService, ServiceConfig, ServiceDeps};
use herald_monitor::HealthProbes;
use herald_notifier::{PgChangeFeed, PushClient};

use herald_api::routes::create_router;
use herald_api::state::ApiState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald=info,herald_notifier=debug,herald_engine=info,tower_http=info")
        }))
        .json()
        .init();

    tracing::info!("Starting Herald notification service...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    migrate(&pool).await?;

    let backend: Arc<dyn BackendStore> = Arc::new(PgBackend::new(pool.clone()));

    let service = Arc::new(NotificationService::new(
        ServiceDeps {
            backend: backend.clone(),
            store: Arc::new(FileStore::new(config.cache_dir.clone())),
            tokens: Arc::new(StaticTokenSource::new(config.device_push_token.clone())),
            feed: Arc::new(PgChangeFeed::new(pool)),
            push: PushClient::new(
                config.push_api_url.clone(),
                config.push_access_token.clone(),
                TimeoutPolicy {
                    timeout: Duration::from_millis(config.push_timeout_ms),
                    retries: config.push_send_retries,
                    backoff: Duration::from_millis(config.push_backoff_ms),
                },
            ),
            probes: HealthProbes::standard(
                config.push_health_url.clone(),
                config.push_access_token.clone(),
                backend,
            ),
        },
        ServiceConfig::from_app_config(&config),
    ));
    service.start().await?;

    // Build router
    let app = create_router(ApiState::new(service.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await;

    service.shutdown().await;
    served?;

    tracing::info!("Herald notification service stopped.");
    Ok(())
}
