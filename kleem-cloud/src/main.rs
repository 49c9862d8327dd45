//! kleem-cloud: catalog sync coordinator service
//!
//! Long-running service that:
//! - Accepts catalog sync requests (dashboard, platform webhooks)
//! - Runs at most one sync per merchant via a Redis lock
//! - Pushes sync progress to connected dashboards over WebSocket

use kleem_cloud::bus::SyncConsumer;
use kleem_cloud::tasks::{self, BackgroundTasks, TaskKind};
use kleem_cloud::{AppState, Config, api};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kleem_cloud=info,tower_http=info".into());

    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Listens for SIGTERM and Ctrl+C
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_tracing(&config.log_format);

    tracing::info!("Starting kleem-cloud (env: {})", config.environment);

    let http_port = config.http_port;
    let concurrency = config.consumer_concurrency;
    let (state, bus_rx) = AppState::new(config).await?;

    let mut tasks = BackgroundTasks::new();
    let consumer = SyncConsumer::new(
        bus_rx,
        state.coordinator.clone(),
        concurrency,
        tasks.shutdown_token(),
    );
    tasks.spawn("catalog_sync_consumer", TaskKind::Worker, consumer.run());
    tasks::spawn_maintenance(&mut tasks, &state);
    tasks.log_summary();

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("kleem-cloud HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // HTTP is down; let in-flight syncs finish and release their locks
    tasks.shutdown().await;

    Ok(())
}
