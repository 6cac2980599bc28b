use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hermes_core::EngineConfig;
use hermes_server::routes;
use hermes_server::state::{AppState, build_runner};
use hermes_store::{FileSnapshotStore, StoreConfig};

const DEFAULT_FILTER: &str = "hermes_core=info,hermes_client=info,hermes_server=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_target(false)
        .init();

    let api_key = std::env::var("HERMES_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());
    if api_key.is_none() {
        tracing::warn!("HERMES_API_KEY not set, /v1 routes are open");
    }
    let port = std::env::var("HERMES_SERVER_PORT").unwrap_or_else(|_| "8000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let engine = EngineConfig::from_env()?;
    let sites = engine.site_registry()?;
    let snapshots = FileSnapshotStore::from_config(&StoreConfig::from_env()?);
    tracing::info!(
        sites = ?sites.keys(),
        proxies = engine.proxy_pool().len(),
        jobs_file = %snapshots.path().display(),
        "Engine configured"
    );

    let runner = build_runner(&engine, sites, snapshots);
    runner.restore().await?;

    let state = Arc::new(AppState {
        runner: runner.clone(),
        api_key,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runner.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
