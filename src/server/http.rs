//! HTTP handlers for prediction, training and status

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, warn};

use crate::error::LifecycleError;
use crate::learning::ModelSummary;
use crate::prediction::PredictionResult;
use crate::server::ServerState;
use crate::types::parse_claims_document;

/// Prediction response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    /// `null` until a model has been trained
    pub approved_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<u64>,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            approved_amount: result.amount(),
            model_version: result.model_version(),
        }
    }
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub buffer_records: usize,
    pub model: Option<ModelSummary>,
}

/// Map a lifecycle error to a status code and JSON body
pub fn error_response(err: &LifecycleError) -> Response {
    if err.is_caller_error() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "Invalid input",
                "details": err.to_string()
            })),
        )
            .into_response();
    }

    error!("Request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal error",
            "details": err.to_string()
        })),
    )
        .into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    (
        rejection.status(),
        Json(json!({
            "error": "Invalid JSON body",
            "details": rejection.body_text()
        })),
    )
        .into_response()
}

/// Liveness, independent of model state
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Predict a payout from five sensor features
pub async fn predict_handler(
    State(state): State<ServerState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    match state.lifecycle.engine.predict_json(&body) {
        Ok(result) => (StatusCode::OK, Json(PredictResponse::from(result))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Run one training cycle over `{"claims": [...]}`
pub async fn train_handler(
    State(state): State<ServerState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    let records = match parse_claims_document(&body) {
        Ok(records) => records,
        Err(e) => return error_response(&LifecycleError::from(e)),
    };

    let trainer = state.lifecycle.trainer.clone();
    let limit = Duration::from_secs(state.config.training.timeout_secs);
    let cycle = tokio::task::spawn_blocking(move || trainer.train(records));

    match tokio::time::timeout(limit, cycle).await {
        Ok(Ok(Ok(outcome))) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Ok(Err(e))) => error_response(&e),
        Ok(Err(join_err)) => {
            error!("Training task aborted: {}", join_err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Training task aborted" })),
            )
                .into_response()
        }
        Err(_) => {
            // The cycle keeps running; append and publish are atomic on their own
            warn!("Training cycle exceeded {}s", limit.as_secs());
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Training timed out",
                    "details": format!("cycle did not finish within {}s", limit.as_secs())
                })),
            )
                .into_response()
        }
    }
}

/// Buffer size and committed model summary
pub async fn status_handler(State(state): State<ServerState>) -> Response {
    match state.lifecycle.status() {
        Ok(status) => {
            let response = StatusResponse {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                buffer_records: status.buffer_records,
                model: status.model,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Drop the cached artifact and read it again from disk
pub async fn reload_handler(State(state): State<ServerState>) -> Response {
    match state.lifecycle.registry.reload() {
        Ok(model) => (
            StatusCode::OK,
            Json(json!({ "model": model.map(|m| m.summary()) })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
