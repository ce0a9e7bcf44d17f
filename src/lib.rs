pub mod api;
pub mod assistant;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod models;
pub mod policy;
pub mod records;
pub mod redaction;
pub mod schema;
pub mod session;
pub mod summary;
pub mod transfer;

use crate::config::{AppConfig, ServeConfig};
use crate::dashboard::DashboardCore;
use crate::errors::AppResult;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// JSON logs to daily files under `log_dir`, or plain text on stderr without one.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), String> {
    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string());
    };

    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

/// Run the HTTP API until Ctrl-C.
pub async fn serve(config: &AppConfig, serve: &ServeConfig) -> AppResult<()> {
    let core = DashboardCore::new(config)?;
    let app = api::create_router(core, &serve.cors_origins);

    tracing::info!(listen_addr = %serve.listen_addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&serve.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
