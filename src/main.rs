use anyhow::{Context, Result};
use mimalloc::MiMalloc;
use newsdesk::adapter;
use newsdesk::api;
use newsdesk::core::config::{
    ConfigStore, Configurable, LogConfig, SeedConfig, ServerConfig, StorageConfig,
};
use newsdesk::core::{logging, seed};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration
    let config = ConfigStore::from_env()?;
    let log: LogConfig = config.get()?;
    let _guard = logging::init(&log)?;

    let server: ServerConfig = config.get()?;
    let storage_config: StorageConfig = config.get()?;
    let seed_config: SeedConfig = config.get()?;
    if let Some(path) = config.path() {
        info!("Configuration: {}", path.display());
    }
    if !config.has_section(StorageConfig::PREFIX) {
        warn!(
            "No [{}] section, using the {:?} backend",
            StorageConfig::PREFIX,
            storage_config.backend
        );
    }

    // 2. Storage
    let storage = adapter::connect(&storage_config)
        .await
        .context("Failed to connect storage backend")?;

    if seed_config.enabled {
        seed::run(storage.as_ref(), &seed_config)
            .await
            .context("Failed to seed storage")?;
    }

    // 3. Serve
    let app = api::router(storage.clone(), &server);
    let listener = TcpListener::bind(&server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", server.addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutting down {}", storage.describe());
    storage.close().await;

    served.context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
