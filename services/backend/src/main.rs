use anyhow::{Context, Result};
use presenton_backend::api::start_api_server;
use presenton_backend::config::{Config, EnvSnapshot};
use presenton_backend::connection::{resolve_detailed, Resolution};
use presenton_backend::engine::Database;
use presenton_backend::object_storage::{Publisher, S3ObjectStore};
use presenton_backend::AppState;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    let env = EnvSnapshot::from_env();

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Presenton backend"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let resolution = resolve_detailed(&env);
    report_resolution(&resolution);

    let database = Arc::new(
        Database::connect(&resolution.config, &config.database)
            .await
            .context("Failed to connect to database")?,
    );

    let object_store = Arc::new(S3ObjectStore::new(&config.storage).await);
    let publisher = Arc::new(Publisher::new(object_store, &env));
    if publisher.bucket().is_none() {
        info!("GCS_BUCKET not set, file publishing disabled");
    }

    let state = AppState {
        service_name: config.service.name.clone(),
        database: database.clone(),
        publisher,
        env: Arc::new(env),
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Presenton backend started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down Presenton backend");

    api_handle.abort();
    database.close().await;

    info!("Presenton backend stopped");

    Ok(())
}

/// Log how the database URL was resolved
fn report_resolution(resolution: &Resolution) {
    if let Some(ref e) = resolution.split_error {
        metrics::counter!("database.resolve.fallback").increment(1);
        warn!(
            error = %e,
            "DATABASE_URL could not be parsed, using it without query sanitization"
        );
    }

    if !resolution.dropped_parameters.is_empty() {
        debug!(
            parameters = ?resolution.dropped_parameters,
            "Dropped query parameters from DATABASE_URL"
        );
    }

    info!(
        url = %resolution.config.redacted_url(),
        default = resolution.used_default,
        connect_args = ?resolution.config.connect_args.keys().collect::<Vec<_>>(),
        "Resolved database connection"
    );
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
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
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
