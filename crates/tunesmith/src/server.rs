//! Process wiring: sweep, connect to the model, bind, serve.

use std::sync::Arc;

use anyhow::{Context, Result};
use oracle::{GeminiBackend, Oracle};
use smithconf::SmithConfig;
use tracing::info;

use crate::storage;
use crate::web::{self, WebState};

/// Build the shared state from configuration.
///
/// Clears leftovers from the upload directory and uploads the defaults table
/// to the model's file store.
pub async fn prepare(config: &SmithConfig) -> Result<WebState> {
    let paths = &config.infra.paths;

    let report = storage::sweep(&paths.upload_dir)
        .with_context(|| format!("Failed to prepare {}", paths.upload_dir.display()))?;
    info!(
        dir = %paths.upload_dir.display(),
        deleted = report.deleted,
        failed = report.failed,
        "swept upload directory"
    );

    let backend = GeminiBackend::from_config(&config.bootstrap.model)
        .context("Failed to configure Gemini backend")?;
    info!(model = backend.model(), "using Gemini");

    let oracle = Oracle::connect(Arc::new(backend), &paths.defaults_table)
        .await
        .with_context(|| {
            format!(
                "Failed to upload defaults table {}",
                paths.defaults_table.display()
            )
        })?;

    let mut state = WebState::new(
        Arc::new(oracle),
        paths.upload_dir.clone(),
        &config.bootstrap.session.placeholder_audio,
    );
    if paths.static_dir.is_dir() {
        state = state.with_static_dir(paths.static_dir.clone());
    }
    Ok(state)
}

/// Run the HTTP server until SIGINT or SIGTERM.
pub async fn run(config: SmithConfig) -> Result<()> {
    let state = prepare(&config).await?;
    let app = web::router(state);

    let addr = config.infra.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Tunesmith listening on http://{}", addr);
    info!("   Upload: POST http://{}/upload", addr);
    info!("   Preset: GET http://{}/get-preset", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
