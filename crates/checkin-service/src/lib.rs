//! Check-in Service
//!
//! Backend for the in-store loyalty check-in form. A customer scans a QR code
//! posted at the counter, the page obtains a short-lived access token, and the
//! form submission is accepted only while that token is valid and the device
//! reports a position inside the store geofence. Accepted check-ins add one
//! point to the customer's record, keyed by phone number; every
//! `REWARD_THRESHOLD` points earns a free coffee.
//!
//! ## Endpoints
//!
//! - `POST /token/issue` - Issue an access token
//! - `POST /token/validate` - Check an access token
//! - `GET /checkin` - Page load; issues a token when none is supplied
//! - `POST /checkin` - Submit a check-in
//! - `GET /stats` - Customer count
//! - `GET /health` - Health check

pub mod config;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod storage;
pub mod tokens;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use loyalty_common::{Clock, SystemClock};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{Config, StorageBackend};
pub use handlers::AppState;
pub use ledger::LoyaltyLedger;
pub use orchestrator::{
    CheckinOrchestrator, CheckinOutcome, CheckinRequest, CoordinateInput, PageEntry,
};
pub use storage::{CustomerStore, TokenRegistry};
pub use tokens::TokenService;

impl AppState {
    /// Wire the services over the given stores.
    pub fn new(
        config: &Config,
        registry: Arc<dyn TokenRegistry>,
        customers: Arc<dyn CustomerStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let tokens = Arc::new(TokenService::new(
            registry,
            clock.clone(),
            config.token_validity()?,
            config.storage_timeout(),
        ));
        let ledger = Arc::new(LoyaltyLedger::new(
            customers,
            clock,
            config.reward_threshold,
            config.storage_timeout(),
        ));
        let orchestrator = Arc::new(CheckinOrchestrator::new(
            tokens.clone(),
            ledger.clone(),
            config.geofence()?,
            config.token_single_use,
        ));

        Ok(Self {
            tokens,
            ledger,
            orchestrator,
        })
    }

    /// Build state with the stores selected by `config.storage_backend`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (registry, customers): (Arc<dyn TokenRegistry>, Arc<dyn CustomerStore>) =
            match config.storage_backend {
                StorageBackend::Memory => {
                    info!("Using in-memory storage");
                    (
                        Arc::new(storage::MemoryTokenRegistry::new()),
                        Arc::new(storage::MemoryCustomerStore::new()),
                    )
                }
                StorageBackend::Redis => {
                    info!("Using Redis storage at {}", config.redis_url);
                    (
                        Arc::new(storage::RedisTokenRegistry::new(&config.redis_url).await?),
                        Arc::new(storage::RedisCustomerStore::new(&config.redis_url).await?),
                    )
                }
            };

        Self::new(config, registry, customers, Arc::new(SystemClock))
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/token/issue", post(handlers::issue_token_handler))
        .route("/token/validate", post(handlers::validate_token_handler))
        .route(
            "/checkin",
            get(handlers::entry_handler).post(handlers::checkin_handler),
        )
        .route("/stats", get(handlers::stats_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
