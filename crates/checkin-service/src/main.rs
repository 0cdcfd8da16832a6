//! Check-in Service
//!
//! REST API for QR check-in and loyalty points

use anyhow::{Context, Result};
use checkin_service::{create_router, AppState, Config, StorageBackend};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Check-in Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Store at ({}, {}), geofence radius {}m",
        config.store_latitude, config.store_longitude, config.geofence_radius_meters
    );
    info!(
        "Token validity {}s (single use: {}), reward every {} points",
        config.token_validity_secs, config.token_single_use, config.reward_threshold
    );

    // Create application state
    let state = AppState::from_config(&config)
        .await
        .context("Failed to initialize storage")?;

    // In-memory tokens have no native expiry
    let sweeper = match config.storage_backend {
        StorageBackend::Memory => Some(
            state
                .tokens
                .clone()
                .spawn_sweeper(config.token_sweep_interval()),
        ),
        StorageBackend::Redis => None,
    };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("Check-in Service running on http://{}", config.api_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    info!("Check-in Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
