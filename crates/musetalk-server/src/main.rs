//! MuseTalk Server - HTTP API for lip-sync inference

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use musetalk_core::{LipSyncService, Settings};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "musetalk_server=debug,musetalk_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MuseTalk Server v{}", musetalk_core::VERSION);

    // Load configuration
    let settings = Settings::load()?;
    info!("Model version: {}", settings.engine.model_version);
    info!("MuseTalk directory: {:?}", settings.engine.musetalk_root());
    info!(
        "Max concurrent jobs: {}",
        settings.engine.max_concurrent_jobs
    );

    let service = LipSyncService::new(&settings.engine);

    let gpu = service.gpu_status().await;
    match gpu.name.as_deref() {
        Some(name) => info!("GPU: {}", name),
        None => warn!("No CUDA device detected, inference will be slow or fail"),
    }

    if settings.server.preload_models {
        info!("Preloading models");
        service.preload().await?;
    }

    let state = AppState::new(service);
    let app = api::create_router(state, &settings.server);

    // Start server
    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received");
}
