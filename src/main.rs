use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use placebook::api::{create_router, AppState};
use placebook::compactor::run_compactor;
use placebook::config::Config;
use placebook::engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    placebook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(EngineConfig {
        wal_path: config.journal_path(),
        enforce_availability: config.enforce_availability,
    })?);

    tokio::spawn(run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval(),
    ));

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("placebook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  enforce_availability: {}", config.enforce_availability);
    info!(
        "  gateway token: {}",
        if config.gateway_token.is_some() { "required" } else { "not required" }
    );
    info!(
        "  compaction: every {}s past {} appends",
        config.compact_interval().as_secs(),
        config.compact_threshold
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let app = create_router(AppState::new(engine, config.gateway_token.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("placebook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. In-flight requests drain before serve returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
