use std::time::Duration;

use db::DbErr;
use deployment::{Deployment, DeploymentError};
use server::{DeploymentImpl, http};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, prelude::*};

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(15);
const WORKSPACE_CRATES: [&str; 6] = [
    "server",
    "db",
    "deployment",
    "local_deployment",
    "config",
    "utils_core",
];

#[derive(Debug, Error)]
pub enum TaskTilesError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error("Invalid log filter: {0}")]
    LogFilter(String),
}

/// Quiet third-party crates, `level` for ours and for request traces.
fn filter_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        WORKSPACE_CRATES
            .iter()
            .chain(["tower_http"].iter())
            .map(|target| format!("{target}={level}")),
    );
    directives.join(",")
}

#[tokio::main]
async fn main() -> Result<(), TaskTilesError> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(filter_directives(&log_level))
        .map_err(|err| TaskTilesError::LogFilter(err.to_string()))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let deployment = DeploymentImpl::new().await?;
    let (host, port) = {
        let config = deployment.config().read().await;
        (config.host.clone(), config.port)
    };

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(
        "Server running on http://{host}:{}",
        listener.local_addr()?.port()
    );

    axum::serve(listener, http::router(deployment.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if tokio::time::timeout(CLEANUP_TIMEOUT, close_store(deployment))
        .await
        .is_err()
    {
        tracing::warn!("Closing the database timed out after {CLEANUP_TIMEOUT:?}");
    }
    Ok(())
}

/// Closes the pool so SQLite checkpoints the WAL before exit.
async fn close_store(deployment: DeploymentImpl) {
    let pool = deployment.db().pool.clone();
    drop(deployment);
    if let Err(e) = pool.close().await {
        tracing::warn!("Failed to close database cleanly: {e}");
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
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
    tracing::info!("Shutdown signal received, draining connections");
}
