use common::tracing::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weather_service::clock::SystemClock;
use weather_service::config::Config;
use weather_service::handlers::AppState;
use weather_service::{app, build_service};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_tracing(config.log_format);

    if let Err(e) = config.api_key() {
        warn!(error = %e, "Weather lookups will fail until the API key is configured");
    }

    let cancellation_token = CancellationToken::new();
    let service = build_service(&config, Arc::new(SystemClock), cancellation_token.clone())?;

    let state = AppState {
        weather: Arc::new(service),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        %addr,
        current_ttl_ms = config.current_ttl.num_milliseconds(),
        forecast_ttl_ms = config.forecast_ttl.num_milliseconds(),
        "Weather service starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(cancellation_token))
        .await?;

    info!("Weather service stopped");
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    // Abort upstream fetches still in flight; nothing partial is cached.
    cancellation_token.cancel();
    warn!("Cancelled in-flight requests, shutting down gracefully...");
}
