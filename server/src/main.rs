use std::net::SocketAddr;

use anyhow::Context;
use speech_server::{build_router, config::ServerConfig, engine::load_pipeline, AppState};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    info!("Initializing Kokoro TTS pipeline...");
    let pipeline_config = config.pipeline.clone();
    let pipeline = tokio::task::spawn_blocking(move || load_pipeline(&pipeline_config))
        .await
        .context("pipeline loader task failed")?
        .map_err(|e| {
            error!("Failed to start Kokoro server - pipeline initialization failed: {e:#}");
            e
        })?;
    info!("Kokoro pipeline initialized and ready!");

    let state = AppState::new(Some(pipeline), config.clone());

    info!("Pre-loading voices...");
    let voices = state.voices.clone();
    let allowed = config.allowed_voices.clone();
    let failures = tokio::task::spawn_blocking(move || voices.preload(&allowed))
        .await
        .context("voice preload task failed")?;
    if !failures.is_empty() {
        warn!("{} voice(s) failed to pre-load", failures.len());
    }
    info!(
        "{} voice(s) cached from {}",
        state.voices.len(),
        config.pipeline.voices_dir.display()
    );

    let app = build_router(state);

    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("invalid HOST/PORT: {}", config.bind_addr()))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server ready on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
