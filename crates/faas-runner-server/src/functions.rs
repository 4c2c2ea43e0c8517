//! Function metadata API.
//!
//! # Endpoints
//!
//! - `POST /submit-function` - Store a new function
//! - `GET /functions` - List all functions
//! - `GET /functions/:id` - Get one function
//! - `PUT /functions/:id` - Update title, description or code
//! - `DELETE /functions/:id` - Delete a function

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::{info, instrument, warn};

use faas_runner_common::{FunctionId, FunctionRecord, FunctionUpdate};

use crate::request::SubmitFunctionRequest;
use crate::response::{ApiError, SubmitFunctionResponse};
use crate::state::AppState;

/// Build the function metadata router.
pub fn build_functions_router() -> Router<AppState> {
    Router::new()
        .route("/submit-function", post(submit_function))
        .route("/functions", get(list_functions))
        .route(
            "/functions/:id",
            get(get_function).put(update_function).delete(delete_function),
        )
}

/// Store a new function.
///
/// # Response
///
/// ```json
/// {
///   "message": "Function saved successfully",
///   "functionId": 1
/// }
/// ```
#[instrument(skip_all)]
pub async fn submit_function(
    State(state): State<AppState>,
    Json(request): Json<SubmitFunctionRequest>,
) -> Result<(StatusCode, Json<SubmitFunctionResponse>), ApiError> {
    let function = request.into_new_function();
    if let Err(e) = function.validate() {
        warn!(error = %e, "Rejected function submission");
        return Err(e.into());
    }

    let record = state.functions().create_function(function).await?;
    info!(
        function_id = record.id,
        language = %record.language,
        route = %record.route,
        "Function stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitFunctionResponse {
            message: "Function saved successfully".to_string(),
            function_id: record.id,
        }),
    ))
}

pub async fn list_functions(
    State(state): State<AppState>,
) -> Result<Json<Vec<FunctionRecord>>, ApiError> {
    Ok(Json(state.functions().list_functions().await?))
}

pub async fn get_function(
    State(state): State<AppState>,
    Path(id): Path<FunctionId>,
) -> Result<Json<FunctionRecord>, ApiError> {
    state
        .functions()
        .get_function(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Function not found"))
}

#[instrument(skip(state, update))]
pub async fn update_function(
    State(state): State<AppState>,
    Path(id): Path<FunctionId>,
    Json(update): Json<FunctionUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.functions().update_function(id, update).await?;
    info!(function_id = id, "Function updated");
    Ok(Json(serde_json::json!({ "message": "Function updated" })))
}

#[instrument(skip(state))]
pub async fn delete_function(
    State(state): State<AppState>,
    Path(id): Path<FunctionId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.functions().delete_function(id).await?;
    info!(function_id = id, "Function deleted");
    Ok(Json(serde_json::json!({ "message": "Function deleted" })))
}
