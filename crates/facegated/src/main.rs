use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod service;
mod store;

#[cfg(test)]
mod testing;

use config::Config;
use service::FaceService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facegated starting");

    let config = Config::load().context("invalid configuration")?;
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        store = ?config.store.backend,
        threshold = config.similarity_threshold,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config.detector_model_path(), &config.recognizer_model_path())
        .context("failed to start inference engine")?;
    let store = store::connect(&config.store)
        .await
        .context("failed to open embedding store")?;

    let service = FaceService::new(Arc::new(engine), store, config.similarity_threshold);
    let app = api::router(api::AppState::new(service), &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "facegated ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}
