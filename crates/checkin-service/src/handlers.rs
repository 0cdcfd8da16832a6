//! API request handlers for the Check-in Service

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use loyalty_common::{Error, ErrorKind};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    ledger::LoyaltyLedger,
    models::{
        CheckinBody, CheckinResponse, EntryQuery, EntryResponse, ErrorResponse,
        IssueTokenResponse, StatsResponse, ValidateTokenRequest, ValidateTokenResponse,
    },
    orchestrator::CheckinOrchestrator,
    tokens::TokenService,
};

/// Shared application state
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub ledger: Arc<LoyaltyLedger>,
    pub orchestrator: Arc<CheckinOrchestrator>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    pub distance_meters: Option<f64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            message: self.message,
            kind: self.kind.to_string(),
            distance_meters: self.distance_meters,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorKind::LocationRejected => StatusCode::FORBIDDEN,
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let mut distance_meters = None;
        let message = match err {
            Error::InvalidToken => {
                "Invalid or expired access. Please scan the QR code again.".to_string()
            }
            Error::LocationRejected {
                distance_meters: distance,
            } => {
                distance_meters = distance.map(|d| d.round());
                "You must be at the store to check in.".to_string()
            }
            Error::InvalidLocation(_) => {
                "Location is required to check in. Please allow location access and try again."
                    .to_string()
            }
            Error::Validation(message) => message,
            other => {
                error!("Storage failure: {}", other);
                "Service temporarily unavailable. Please try again shortly.".to_string()
            }
        };

        ApiError {
            status,
            kind,
            message,
            distance_meters,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::ValidationError,
            message: format!("Invalid request body: {}", rejection.body_text()),
            distance_meters: None,
        }
    }
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let checks = async {
        state.tokens.health_check().await?;
        state.ledger.health_check().await
    };

    match checks.await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "service": "checkin-service"
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "service": "checkin-service",
                "error": e.to_string()
            })),
        )
            .into_response(),
    }
}

/// Issue a new access token
pub async fn issue_token_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IssueTokenResponse>, ApiError> {
    let token = state.tokens.issue().await?;
    Ok(Json(token.into()))
}

/// Validate an access token
pub async fn validate_token_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateTokenRequest>, JsonRejection>,
) -> Result<Json<ValidateTokenResponse>, ApiError> {
    // A body that cannot be decoded is just another invalid token.
    let token = payload.map(|Json(p)| p.token).unwrap_or_default();
    let status = state.tokens.validate(token.trim()).await?;
    Ok(Json(status.into()))
}

/// Check-in page load: validates the supplied token or issues one
pub async fn entry_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<EntryResponse>, ApiError> {
    let entry = state.orchestrator.enter(query.token.as_deref()).await?;
    if entry.issued {
        info!("Issued token for check-in page without one");
    }
    Ok(Json(entry.into()))
}

/// Submit a check-in
pub async fn checkin_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CheckinBody>, JsonRejection>,
) -> Result<Json<CheckinResponse>, ApiError> {
    let Json(body) = payload?;
    let outcome = state.orchestrator.checkin(&body.into()).await?;
    Ok(Json(outcome.into()))
}

/// Service stats
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let customers = state.ledger.customer_count().await?;
    Ok(Json(StatsResponse { customers }))
}
