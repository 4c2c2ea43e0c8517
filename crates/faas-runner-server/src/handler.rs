//! Request handlers for function execution and monitoring.
//!
//! This module provides HTTP handlers for executing stored functions,
//! reading the metrics summary and checking server health.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info, instrument, warn};

use faas_runner_common::MetricsSummary;

use crate::request::ExecuteRequest;
use crate::response::{ApiError, ExecuteResponse};
use crate::state::AppState;

/// Banner handler.
pub async fn index() -> impl IntoResponse {
    (StatusCode::OK, "faas-runner is running")
}

/// Execute a stored function.
///
/// Returns 200 for every execution that ran, including failed and timed
/// out ones; `success` tells them apart.
#[instrument(skip_all, fields(function_id = ?request.function_id))]
pub async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let function_id = request
        .function_id
        .ok_or_else(|| ApiError::bad_request("Missing functionId"))?;

    match state
        .coordinator()
        .execute(function_id, request.runtime.as_deref())
        .await
    {
        Ok(result) => {
            info!(
                function_id,
                success = result.success,
                duration_ms = result.duration_ms,
                "Request completed"
            );
            Ok(Json(result.into()))
        }
        Err(e) => {
            if e.is_user_error() {
                warn!(function_id, error = %e, "Request rejected");
            } else {
                error!(function_id, error = %e, "Request failed");
            }
            Err(e.into())
        }
    }
}

/// Aggregated metrics per function and runtime.
pub async fn metrics_summary(
    State(state): State<AppState>,
) -> Result<Json<Vec<MetricsSummary>>, ApiError> {
    let summary = state.metrics().summary().await?;
    Ok(Json(summary))
}

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// Reports image and warm pool state per runtime.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = state.coordinator();
    let runtimes: Vec<serde_json::Value> = coordinator
        .pool()
        .status_all()
        .into_iter()
        .map(|status| {
            serde_json::json!({
                "runtime": status.runtime,
                "image_built": coordinator.images().is_built(status.runtime),
                "idle": status.idle,
                "busy": status.busy,
                "dead": status.dead,
            })
        })
        .collect();

    let body = serde_json::json!({
        "status": "ready",
        "runtimes": runtimes,
    });

    (StatusCode::OK, Json(body))
}
