//! Request and response bodies of the HTTP contract

use crate::orchestrator::{CheckinOutcome, CheckinRequest, CoordinateInput, PageEntry};
use chrono::{DateTime, Utc};
use loyalty_common::{AccessToken, CustomerSnapshot, TokenStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Response from `POST /token/issue`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenResponse {
    /// Opaque token value to embed in the check-in URL
    pub value: String,

    /// Validity window in seconds
    pub valid_for: i64,

    pub expires_at: DateTime<Utc>,
}

impl From<AccessToken> for IssueTokenResponse {
    fn from(token: AccessToken) -> Self {
        Self {
            valid_for: token.validity_seconds(),
            expires_at: token.expires_at,
            value: token.value,
        }
    }
}

/// Request to `POST /token/validate`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValidateTokenRequest {
    #[serde(default)]
    pub token: String,
}

/// Response from `POST /token/validate`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenResponse {
    pub valid: bool,

    /// Seconds left, only present for valid tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<i64>,
}

impl From<TokenStatus> for ValidateTokenResponse {
    fn from(status: TokenStatus) -> Self {
        Self {
            valid: status.valid,
            remaining_time: status.remaining_seconds,
        }
    }
}

/// Query string of `GET /checkin`
#[derive(Debug, Default, Deserialize)]
pub struct EntryQuery {
    pub token: Option<String>,
}

/// Response from `GET /checkin`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub token: String,

    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<i64>,

    /// Whether the token was issued for this request
    pub issued: bool,
}

impl From<PageEntry> for EntryResponse {
    fn from(entry: PageEntry) -> Self {
        Self {
            token: entry.token,
            valid: entry.valid,
            remaining_time: entry.remaining_seconds,
            issued: entry.issued,
        }
    }
}

/// Request to `POST /checkin`
///
/// Decoding never fails on a field's type: an incomplete or mistyped form
/// goes through the normal rejection path, token first.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CheckinBody {
    #[serde(default, deserialize_with = "lenient_text")]
    pub token: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub phone: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub email: String,

    #[serde(default)]
    pub latitude: Option<Value>,

    #[serde(default)]
    pub longitude: Option<Value>,
}

/// Strings pass through, numbers keep their digits, anything else is blank.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    })
}

fn coordinate(value: Option<Value>) -> CoordinateInput {
    match value {
        None | Some(Value::Null) => CoordinateInput::Missing,
        Some(Value::Number(number)) => number
            .as_f64()
            .map_or(CoordinateInput::Malformed, CoordinateInput::Value),
        Some(_) => CoordinateInput::Malformed,
    }
}

impl From<CheckinBody> for CheckinRequest {
    fn from(body: CheckinBody) -> Self {
        Self {
            token: body.token,
            name: body.name,
            phone: body.phone,
            email: body.email,
            latitude: coordinate(body.latitude),
            longitude: coordinate(body.longitude),
        }
    }
}

/// Successful response from `POST /checkin`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResponse {
    pub message: String,
    pub customer: CustomerSnapshot,
    pub earned_reward: bool,
    pub points_to_next_reward: u32,
}

impl From<CheckinOutcome> for CheckinResponse {
    fn from(outcome: CheckinOutcome) -> Self {
        Self {
            message: outcome.message,
            customer: outcome.result.customer,
            earned_reward: outcome.result.earned_reward,
            points_to_next_reward: outcome.result.points_to_next_reward,
        }
    }
}

/// Body of every rejection
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,

    /// One of InvalidToken, LocationRejected, ValidationError, StorageUnavailable
    pub kind: String,

    /// Distance from the store, for geofence rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

/// Response from `GET /stats`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub customers: usize,
}
