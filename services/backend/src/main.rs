use anyhow::{Context, Result};
use emogo_backend::routes::{start_api_server, AppState};
use emogo_backend::{Config, PgRecordStore, S3BlobStore};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting EmoGo backend"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Shared store handles, reused by every request
    let records = PgRecordStore::new(&config.database)
        .await
        .context("Failed to initialize record store")?;

    if config.database.ensure_schema {
        records
            .ensure_schema()
            .await
            .context("Failed to prepare record tables")?;
    }

    let blobs = S3BlobStore::new(&config.s3)
        .await
        .context("Failed to initialize blob store")?;

    let state = AppState {
        records: Arc::new(records),
        blobs: Arc::new(blobs),
        dashboard: config.dashboard.clone(),
    };

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("EmoGo backend stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
