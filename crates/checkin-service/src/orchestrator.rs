//! The check-in use case: token, then location, then identity, then ledger.

use crate::ledger::LoyaltyLedger;
use crate::tokens::TokenService;
use loyalty_common::{
    AccessToken, AccrualResult, Coordinates, Error, GeoFence, PhoneNumber, Result,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One coordinate as submitted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CoordinateInput {
    /// The device declined or failed to share its location
    #[default]
    Missing,
    /// Present but not a number
    Malformed,
    Value(f64),
}

impl From<f64> for CoordinateInput {
    fn from(value: f64) -> Self {
        CoordinateInput::Value(value)
    }
}

impl From<Option<f64>> for CoordinateInput {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CoordinateInput::Missing, CoordinateInput::Value)
    }
}

/// A check-in submission as received from the form.
#[derive(Debug, Clone, Default)]
pub struct CheckinRequest {
    pub token: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub latitude: CoordinateInput,
    pub longitude: CoordinateInput,
}

/// Successful check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinOutcome {
    pub message: String,
    pub result: AccrualResult,
}

/// What the check-in page needs on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub token: String,
    pub valid: bool,
    pub remaining_seconds: Option<i64>,
    /// True when the token was minted for this page load
    pub issued: bool,
}

pub struct CheckinOrchestrator {
    tokens: Arc<TokenService>,
    ledger: Arc<LoyaltyLedger>,
    geofence: GeoFence,
    single_use_tokens: bool,
}

impl CheckinOrchestrator {
    pub fn new(
        tokens: Arc<TokenService>,
        ledger: Arc<LoyaltyLedger>,
        geofence: GeoFence,
        single_use_tokens: bool,
    ) -> Self {
        Self {
            tokens,
            ledger,
            geofence,
            single_use_tokens,
        }
    }

    /// Page-load entry point. A request without a token gets a fresh one
    /// (the QR code itself carries no token); a supplied token is only
    /// reported on, never replaced.
    pub async fn enter(&self, token: Option<&str>) -> Result<PageEntry> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(value) => {
                let status = self.tokens.validate(value).await?;
                Ok(PageEntry {
                    token: value.to_string(),
                    valid: status.valid,
                    remaining_seconds: status.remaining_seconds,
                    issued: false,
                })
            }
            None => {
                let token = self.tokens.issue().await?;
                Ok(PageEntry {
                    remaining_seconds: Some(token.validity_seconds()),
                    token: token.value,
                    valid: true,
                    issued: true,
                })
            }
        }
    }

    /// Run one check-in. Preconditions short-circuit in order and none of
    /// them touch the ledger; the accrual is the only mutation.
    pub async fn checkin(&self, request: &CheckinRequest) -> Result<CheckinOutcome> {
        let status = self.tokens.validate(request.token.trim()).await?;
        if !status.valid {
            warn!("Check-in rejected: invalid access token");
            return Err(Error::InvalidToken);
        }

        let point = match (request.latitude, request.longitude) {
            (CoordinateInput::Value(latitude), CoordinateInput::Value(longitude)) => {
                Coordinates::new(latitude, longitude)?
            }
            (CoordinateInput::Malformed, _) | (_, CoordinateInput::Malformed) => {
                warn!("Check-in rejected: malformed location");
                return Err(Error::InvalidLocation(
                    "coordinates must be numbers".to_string(),
                ));
            }
            _ => {
                warn!("Check-in rejected: no location shared");
                return Err(Error::InvalidLocation(
                    "location was not provided".to_string(),
                ));
            }
        };
        let distance = self.geofence.check(&point).map_err(|e| {
            warn!("Check-in rejected: {}", e);
            e
        })?;

        let name = request.name.trim();
        let email = request.email.trim();
        if name.is_empty() || email.is_empty() || request.phone.trim().is_empty() {
            warn!("Check-in rejected: missing information");
            return Err(Error::Validation("Please fill in all fields".to_string()));
        }
        let phone = PhoneNumber::parse(&request.phone)?;

        let consumed = if self.single_use_tokens {
            match self.tokens.consume(request.token.trim()).await? {
                Some(token) => Some(token),
                None => {
                    // Another submission used the token between validation and now.
                    warn!("Check-in rejected: access token already used");
                    return Err(Error::InvalidToken);
                }
            }
        } else {
            None
        };

        let result = match self.ledger.accrue_visit(&phone, name, email).await {
            Ok(result) => result,
            Err(e) => {
                if let Some(token) = consumed {
                    self.give_back(&token).await;
                }
                return Err(e);
            }
        };

        info!(
            customer_id = result.customer.id,
            distance_meters = distance,
            earned_reward = result.earned_reward,
            "Check-in accepted"
        );

        Ok(CheckinOutcome {
            message: outcome_message(&result),
            result,
        })
    }

    /// The visit was not recorded, so the token must stay usable for a retry.
    async fn give_back(&self, token: &AccessToken) {
        match self.tokens.restore(token).await {
            Ok(true) => debug!("Access token returned after failed accrual"),
            Ok(false) => warn!("Access token could not be returned after failed accrual"),
            Err(e) => error!("Failed to return access token: {}", e),
        }
    }
}

fn outcome_message(result: &AccrualResult) -> String {
    if result.earned_reward {
        "Congratulations, you earned a free coffee!".to_string()
    } else {
        let n = result.points_to_next_reward;
        format!(
            "Check-in recorded, {} point{} to your next reward.",
            n,
            if n == 1 { "" } else { "s" }
        )
    }
}
