//! JSON response bodies and error mapping.
//!
//! [`ApiError`] converts [`RunnerError`] into an HTTP status and a
//! `{"error": ...}` body. A function that ran and failed is not an
//! `ApiError`; it is a 200 [`ExecuteResponse`] with `success: false`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use faas_runner_common::{FunctionId, RunnerError, StoreError};
use faas_runner_core::ExecutionResult;

/// Error response with JSON body.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<RunnerError> for ApiError {
    fn from(error: RunnerError) -> Self {
        match error {
            RunnerError::FunctionNotFound { .. } | RunnerError::Store(StoreError::NotFound { .. }) => {
                ApiError::not_found("Function not found")
            }
            RunnerError::InvalidFunction { reason } => ApiError::bad_request(reason),
            RunnerError::UnsupportedLanguage { language } => {
                ApiError::bad_request(format!("Unsupported language: {language}"))
            }
            RunnerError::BuildFailed { stderr, .. } => {
                ApiError::internal("Docker build failed").with_details(stderr)
            }
            RunnerError::Backend { operation, reason } => {
                ApiError::internal("Execution failed").with_details(format!("{operation}: {reason}"))
            }
            other => ApiError::internal("Internal server error").with_details(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        RunnerError::from(error).into()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Body of a completed `POST /execute`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub function_id: FunctionId,
    pub language: String,
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Human-readable duration, e.g. `"42ms"`.
    pub duration: String,
    pub pooled: bool,
}

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            success: result.success,
            function_id: result.function_id,
            language: result.language,
            runtime: result.runtime.as_str().to_string(),
            output: result.output,
            error: result.error,
            duration_ms: result.duration_ms,
            duration: format!("{}ms", result.duration_ms),
            pooled: result.pooled,
        }
    }
}

/// Body of `POST /submit-function`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFunctionResponse {
    pub message: String,
    pub function_id: FunctionId,
}

#[cfg(test)]
mod tests {
    use faas_runner_common::SandboxRuntime;

    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (RunnerError::function_not_found(1), StatusCode::NOT_FOUND),
            (RunnerError::invalid_function("no code"), StatusCode::BAD_REQUEST),
            (RunnerError::unsupported_language("ruby"), StatusCode::BAD_REQUEST),
            (
                RunnerError::build_failed("func-python-image", "boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RunnerError::backend("docker run", "daemon down"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_build_failure_message() {
        let err = ApiError::from(RunnerError::build_failed("func-node-image", "no Dockerfile"));
        assert_eq!(err.message, "Docker build failed");
        assert_eq!(err.details.as_deref(), Some("no Dockerfile"));
    }

    #[test]
    fn test_execute_response_shape() {
        let response = ExecuteResponse::from(ExecutionResult {
            success: true,
            function_id: 4,
            language: "python".into(),
            runtime: SandboxRuntime::Gvisor,
            output: Some("hi".into()),
            error: None,
            duration_ms: 42,
            pooled: false,
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["functionId"], 4);
        assert_eq!(json["output"], "hi");
        assert_eq!(json["durationMs"], 42);
        assert_eq!(json["duration"], "42ms");
        assert_eq!(json["runtime"], "gvisor");
        assert!(json.get("error").is_none());
    }
}
