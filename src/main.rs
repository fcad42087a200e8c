use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use folio_api::{
    api::{cors_layer, create_router, AppState},
    config::Config,
    db::{
        self,
        postgres::{CommentQueueBuilder, MediaLibraryBuilder},
        Cache, CacheWriterHandle, ContentRepository, InMemoryContentRepository,
        PgContentRepository,
    },
    models::DataType,
    services::{HubSettings, NotificationHub, PayloadBuilders, RecommendationEngine},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("folio_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let (repository, builders) = build_storage(&config).await?;
    tracing::info!(backend = repository.name(), "Content repository ready");

    let mut hub = NotificationHub::new(
        builders,
        HubSettings {
            heartbeat_interval: config.heartbeat_interval(),
            connection_buffer: config.connection_buffer(),
            snapshot_ttl_secs: config.snapshot_ttl_secs,
        },
    );

    let mut cache_writer: Option<CacheWriterHandle> = None;
    if let Some(redis_url) = &config.redis_url {
        let client = db::create_redis_client(redis_url).context("Invalid REDIS_URL")?;
        let (cache, handle) = Cache::new(client).await;
        hub = hub.with_mirror(cache);
        cache_writer = Some(handle);
        tracing::info!("Snapshot mirror enabled");
    }

    let hub = Arc::new(hub);
    let state = AppState::new(
        RecommendationEngine::new(repository),
        Arc::clone(&hub),
        config.related_default_limit,
    );

    let mut app = create_router(state);
    if let Some(cors) = cors_layer(&config.allowed_origins) {
        app = app.layer(cors);
    }

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&hub)))
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Picks Postgres when `DATABASE_URL` is set, otherwise the in-memory store
async fn build_storage(
    config: &Config,
) -> anyhow::Result<(Arc<dyn ContentRepository>, PayloadBuilders)> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory content store");
        let repository: Arc<dyn ContentRepository> = Arc::new(InMemoryContentRepository::new());
        let builders = PayloadBuilders::for_repository(repository.clone());
        return Ok((repository, builders));
    };

    let pool = db::create_pool(database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let repository: Arc<dyn ContentRepository> = Arc::new(PgContentRepository::new(pool.clone()));
    let builders = PayloadBuilders::for_repository(repository.clone())
        .register(DataType::Media, MediaLibraryBuilder::new(pool.clone()))
        .register(DataType::Comments, CommentQueueBuilder::new(pool));

    Ok((repository, builders))
}

async fn shutdown_signal(hub: Arc<NotificationHub>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    // open event streams would otherwise hold graceful shutdown forever
    hub.close_all();
}
