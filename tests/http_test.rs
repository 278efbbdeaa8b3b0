//! Router tests driven through `tower::ServiceExt::oneshot`
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use agri_payout::config::StorageConfig;
use agri_payout::server::{router, ServerState};
use agri_payout::Config;

fn build_app(dir: &std::path::Path) -> (Router, ServerState) {
    let mut config = Config::default();
    config.storage = StorageConfig::in_dir(dir);
    config.server.body_limit_bytes = 4096;
    let state = ServerState::new(config);
    (router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn claim(expected: f64, approved: f64) -> Value {
    json!({
        "soilMoisture": 27.0,
        "airTemp": 40.0,
        "humidity": 23.5,
        "soilTemp": 35.0,
        "expectedAmount": expected,
        "approvedAmount": approved,
        "cropType": "maize"
    })
}

fn features() -> Value {
    json!({
        "soilMoisture": 27.0,
        "airTemp": 40.0,
        "humidity": 23.5,
        "soilTemp": 35.0,
        "expectedAmount": 1600.0
    })
}

#[tokio::test]
async fn test_liveness() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());
    let (status, body) = send(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_predict_before_training_is_null() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());
    let (status, body) = send(&app, "POST", "/predict", Some(features())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"approvedAmount": null}));
}

#[tokio::test]
async fn test_train_then_predict() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());

    let claims = json!({"claims": [claim(1200.0, 1000.0), claim(2200.0, 2000.0), claim(1700.0, 1500.0)]});
    let (status, body) = send(&app, "POST", "/train", Some(claims)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "trained", "records": 3}));

    let (status, body) = send(&app, "POST", "/predict", Some(features())).await;
    assert_eq!(status, StatusCode::OK);
    let amount = body["approvedAmount"].as_u64().unwrap();
    assert!(amount <= 500_000);
    assert_eq!(body["modelVersion"], json!(1));

    let (status, body) = send(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buffer_records"], json!(3));
    assert_eq!(body["model"]["version"], json!(1));
}

#[tokio::test]
async fn test_train_without_claims_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());
    let (status, body) = send(&app, "POST", "/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "skipped", "reason": "no data", "records": 0}));
}

#[tokio::test]
async fn test_train_with_too_few_claims_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = build_app(dir.path());
    let claims = json!({"claims": [claim(1200.0, 1000.0), claim(2200.0, 2000.0)]});
    let (status, body) = send(&app, "POST", "/train", Some(claims)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], json!("insufficient data"));
    assert_eq!(state.lifecycle.buffer.len().unwrap(), 0);
}

#[tokio::test]
async fn test_one_bad_claim_rejects_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = build_app(dir.path());

    let mut bad = claim(1700.0, 1500.0);
    bad["humidity"] = json!("high");
    let claims = json!({"claims": [claim(1200.0, 1000.0), claim(2200.0, 2000.0), bad]});

    let (status, body) = send(&app, "POST", "/train", Some(claims)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["details"].as_str().unwrap().contains("humidity"));
    assert_eq!(state.lifecycle.buffer.len().unwrap(), 0);
}

#[tokio::test]
async fn test_predict_missing_field_is_422() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());
    let mut input = features();
    input.as_object_mut().unwrap().remove("soilTemp");

    let (status, body) = send(&app, "POST", "/predict", Some(input)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["details"].as_str().unwrap().contains("soilTemp"));
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());
    let claims: Vec<Value> = (0..200).map(|i| claim(1000.0 + i as f64, 900.0)).collect();

    let (status, _) = send(&app, "POST", "/train", Some(json!({ "claims": claims }))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_reload_picks_up_artifact_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path());
    let (_, body) = send(&app, "POST", "/model/reload", None).await;
    assert_eq!(body, json!({"model": null}));

    // A separate process trains against the same storage
    let (other, _) = build_app(dir.path());
    let claims = json!({"claims": [claim(1200.0, 1000.0), claim(2200.0, 2000.0), claim(1700.0, 1500.0)]});
    send(&other, "POST", "/train", Some(claims)).await;

    let (status, body) = send(&app, "POST", "/model/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"]["version"], json!(1));
}
