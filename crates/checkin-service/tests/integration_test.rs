//! Integration tests for the Check-in Service HTTP API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use checkin_service::{
    create_router,
    storage::{MemoryCustomerStore, MemoryTokenRegistry},
    AppState, Config,
};
use loyalty_common::{ManualClock, EARTH_RADIUS_METERS};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

const STORE_LAT: f64 = 40.7128;
const STORE_LON: f64 = -74.0060;

/// Helper to create a test app over in-memory stores and a manual clock
fn create_test_app(config: Config) -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let state = AppState::new(
        &config,
        Arc::new(MemoryTokenRegistry::new()),
        Arc::new(MemoryCustomerStore::new()),
        clock.clone(),
    )
    .unwrap();

    (create_router(state), clock)
}

fn default_app() -> (Router, Arc<ManualClock>) {
    create_test_app(Config {
        store_latitude: STORE_LAT,
        store_longitude: STORE_LON,
        geofence_radius_meters: 100.0,
        token_validity_secs: 300,
        reward_threshold: 5,
        ..Config::default()
    })
}

fn latitude_meters_north(meters: f64) -> f64 {
    STORE_LAT + meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn issue_token(app: &Router) -> String {
    let (status, json) = send(app, "POST", "/token/issue", None).await;
    assert_eq!(status, StatusCode::OK);
    json["value"].as_str().unwrap().to_string()
}

fn checkin_body(token: &str) -> Value {
    json!({
        "token": token,
        "name": "Ada Lovelace",
        "phone": "(555) 123-4567",
        "email": "ada@example.com",
        "latitude": latitude_meters_north(10.0),
        "longitude": STORE_LON
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _clock) = default_app();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "checkin-service");
}

#[tokio::test]
async fn test_issue_and_validate_token() {
    let (app, clock) = default_app();
    let (status, json) = send(&app, "POST", "/token/issue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["validFor"], 300);
    let token = json["value"].as_str().unwrap().to_string();

    clock.advance(chrono::Duration::seconds(120));
    let (status, json) = send(&app, "POST", "/token/validate", Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert_eq!(json["remainingTime"], 180);

    clock.advance(chrono::Duration::seconds(181));
    let (status, json) = send(&app, "POST", "/token/validate", Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    assert!(json.get("remainingTime").is_none());
}

#[tokio::test]
async fn test_validate_never_fails_on_garbage() {
    let (app, _clock) = default_app();

    let (status, json) = send(&app, "POST", "/token/validate", Some(json!({ "token": 42 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);

    let (status, json) = send(&app, "POST", "/token/validate", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
}

#[tokio::test]
async fn test_page_load_without_token_issues_one() {
    let (app, _clock) = default_app();

    let (status, json) = send(&app, "GET", "/checkin", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["issued"], true);
    assert_eq!(json["valid"], true);
    assert_eq!(json["remainingTime"], 300);

    let token = json["token"].as_str().unwrap().to_string();
    let (status, json) = send(&app, "GET", &format!("/checkin?token={}", token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["issued"], false);
    assert_eq!(json["valid"], true);
    assert_eq!(json["token"], token);
}

#[tokio::test]
async fn test_first_checkin() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    let (status, json) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["earnedReward"], false);
    assert_eq!(json["pointsToNextReward"], 4);
    assert_eq!(json["customer"]["id"], 1);
    assert_eq!(json["customer"]["name"], "Ada Lovelace");
    assert_eq!(json["customer"]["currentPoints"], 1);
    assert_eq!(json["customer"]["totalVisits"], 1);
    assert_eq!(json["customer"]["totalRewards"], 0);
    assert!(json["message"].as_str().unwrap().contains("4 points"));
}

#[tokio::test]
async fn test_fifth_checkin_earns_reward() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    for _ in 0..4 {
        let (status, _) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["earnedReward"], true);
    assert_eq!(json["customer"]["currentPoints"], 0);
    assert_eq!(json["customer"]["totalRewards"], 1);
    assert_eq!(json["customer"]["totalVisits"], 5);
    assert_eq!(json["message"], "Congratulations, you earned a free coffee!");
}

#[tokio::test]
async fn test_returning_customer_is_recognized_by_phone() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;

    let mut body = checkin_body(&token);
    body["phone"] = json!("555.123.4567");
    body["name"] = json!("Ada King");
    body["email"] = json!("ada@king.dev");
    let (status, json) = send(&app, "POST", "/checkin", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["customer"]["id"], 1);
    assert_eq!(json["customer"]["name"], "Ada King");
    assert_eq!(json["customer"]["totalVisits"], 2);

    let (_, stats) = send(&app, "GET", "/stats", None).await;
    assert_eq!(stats["customers"], 1);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let (app, clock) = default_app();
    let token = issue_token(&app).await;
    clock.advance(chrono::Duration::seconds(301));

    let (status, json) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "InvalidToken");
    assert!(json["message"].is_string());

    let (_, stats) = send(&app, "GET", "/stats", None).await;
    assert_eq!(stats["customers"], 0);
}

#[tokio::test]
async fn test_checkin_150m_away_rejected() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    let mut body = checkin_body(&token);
    body["latitude"] = json!(latitude_meters_north(150.0));
    let (status, json) = send(&app, "POST", "/checkin", Some(body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "LocationRejected");
    assert_eq!(json["distanceMeters"], 150.0);
}

#[tokio::test]
async fn test_checkin_without_location_rejected() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    let mut body = checkin_body(&token);
    body.as_object_mut().unwrap().remove("latitude");
    body.as_object_mut().unwrap().remove("longitude");
    let (status, json) = send(&app, "POST", "/checkin", Some(body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "LocationRejected");
}

#[tokio::test]
async fn test_checkin_mistyped_coordinates() {
    let (app, _clock) = default_app();

    let mut body = checkin_body("nope");
    body["latitude"] = json!("40.7");
    let (status, json) = send(&app, "POST", "/checkin", Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "InvalidToken");

    let token = issue_token(&app).await;
    let mut body = checkin_body(&token);
    body["latitude"] = json!("40.7");
    let (status, json) = send(&app, "POST", "/checkin", Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "LocationRejected");
}

#[tokio::test]
async fn test_checkin_missing_information_rejected() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    let mut body = checkin_body(&token);
    body["email"] = json!("");
    let (status, json) = send(&app, "POST", "/checkin", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "ValidationError");
    assert_eq!(json["message"], "Please fill in all fields");
}

#[tokio::test]
async fn test_malformed_body_rejected_with_message() {
    let (app, _clock) = default_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/checkin")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["kind"], "ValidationError");
}

#[tokio::test]
async fn test_single_use_tokens() {
    let (app, _clock) = create_test_app(Config {
        store_latitude: STORE_LAT,
        store_longitude: STORE_LON,
        token_single_use: true,
        ..Config::default()
    });
    let token = issue_token(&app).await;

    let (status, _) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "InvalidToken");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkins_same_phone() {
    let (app, _clock) = default_app();
    let token = issue_token(&app).await;

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let app = app.clone();
            let body = checkin_body(&token);
            tokio::spawn(async move { send(&app, "POST", "/checkin", Some(body)).await.0 })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let (_, json) = send(&app, "POST", "/checkin", Some(checkin_body(&token))).await;
    assert_eq!(json["customer"]["totalVisits"], 26);
    assert_eq!(json["customer"]["totalRewards"], 5);
    assert_eq!(json["customer"]["currentPoints"], 1);
}
