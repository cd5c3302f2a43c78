use anyhow::Result;
use crowd_service::{api, CrowdServiceConfig, CrowdServiceState};
use telemetry::LogConfig;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CrowdServiceConfig::from_env()?;

    // Held for the process lifetime so buffered file logs are flushed
    let _log_guard = telemetry::init_structured_logging(
        LogConfig::new("crowd-service").with_node_id(config.node_id.clone()),
    );

    info!("Starting crowd service...");
    info!(
        bind = %config.bind_addr,
        node_id = %config.node_id,
        detector = ?config.detector,
        working_resolution = ?config.engine.working_resolution,
        "crowd service configuration"
    );

    let state = CrowdServiceState::from_config(&config).await?;
    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Crowd service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Crowd service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
