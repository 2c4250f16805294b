use anyhow::Result;
use std::net::SocketAddr;

use api::{routes, state::AppState};
use common::bootstrap::{init_database_pool, init_notification_service, init_push_client};
use common::config::Settings;
use common::scheduler::Scheduler;
use common::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize tracing
    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting API server"
    );

    // Initialize Prometheus metrics exporter
    let metrics_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    telemetry::describe_metrics();
    tracing::info!("Metrics exporter initialized");

    let db_pool = init_database_pool(&config).await?;
    let push = init_push_client(&config)?;
    let notifications = init_notification_service(&config, db_pool.clone(), push).await?;

    let state = AppState::new(db_pool.clone(), notifications.clone(), metrics_handle, config.clone());
    if !state.meeting_tokens.is_configured() {
        tracing::warn!("Meeting token secret not set, /generate-jwt will answer 503");
    }
    let app = routes::create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    notifications.scheduler().stop().await;
    db_pool.close().await;
    telemetry::shutdown_tracer();

    tracing::info!("API server stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
