//! HTTP router configuration.
//!
//! This module provides functions to build the Axum router with all
//! necessary routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::functions::build_functions_router;
use crate::handler::{execute, health_check, index, metrics_summary, readiness_check};
use crate::state::AppState;

/// Build the main application router.
///
/// Routes:
/// - `POST /execute` - Execute a stored function
/// - `GET /metrics-summary` - Aggregated execution metrics
/// - `POST /submit-function`, `/functions[/:id]` - Function metadata
/// - `GET /health` - Health check
/// - `GET /ready` - Readiness check with warm pool state
///
/// `request_timeout` applies to every route except `/execute`, which is
/// bounded by the executed function's own timeout.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let health_routes = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check));

    let bounded_routes = Router::new()
        .route("/metrics-summary", get(metrics_summary))
        .merge(build_functions_router())
        .merge(health_routes)
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/execute", post(execute))
        .merge(bounded_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use faas_runner_common::RuntimeConfig;
    use faas_runner_core::testing::FakeBackend;
    use tower::util::ServiceExt;

    use super::*;

    struct Setup {
        router: Router,
        _work: tempfile::TempDir,
    }

    fn setup_router(backend: FakeBackend) -> Setup {
        setup_router_with_timeout(backend, Duration::from_secs(30))
    }

    fn setup_router_with_timeout(backend: FakeBackend, request_timeout: Duration) -> Setup {
        let work = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.execution.work_dir = work.path().to_path_buf();
        let state = AppState::in_memory(&config, Arc::new(backend)).unwrap();
        Setup {
            router: build_router(state, request_timeout),
            _work: work,
        }
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn submit(router: &Router, language: &str, code: &str) -> u64 {
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/submit-function",
                serde_json::json!({
                    "title": "test",
                    "code": code,
                    "route": "/test",
                    "language": language,
                    "timeout": 5,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["functionId"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let setup = setup_router(FakeBackend::new());

        let response = setup
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_reports_runtimes() {
        let setup = setup_router(FakeBackend::new());

        let response = setup
            .router
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["runtimes"].as_array().unwrap().len(), 2);
        assert_eq!(body["runtimes"][0]["runtime"], "python");
    }

    #[tokio::test]
    async fn test_submit_and_execute() {
        let setup = setup_router(FakeBackend::new());
        let id = submit(&setup.router, "python", "print('hi')").await;
        assert_eq!(id, 1);

        let response = setup
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/execute",
                serde_json::json!({ "functionId": id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["output"], "hi");
        assert_eq!(body["language"], "python");
    }

    #[tokio::test]
    async fn test_execute_outlives_request_timeout() {
        let setup = setup_router_with_timeout(
            FakeBackend::new().with_run_delay(Duration::from_millis(300)),
            Duration::from_millis(100),
        );
        let id = submit(&setup.router, "python", "print('slow')").await;

        let response = setup
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/execute",
                serde_json::json!({ "functionId": id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["output"], "slow");
    }

    #[tokio::test]
    async fn test_failed_execution_is_200() {
        let setup = setup_router(FakeBackend::new());
        let id = submit(&setup.router, "javascript", "throw new Error('nope')").await;

        let response = setup
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/execute",
                serde_json::json!({ "functionId": id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_execute_error_statuses() {
        let setup = setup_router(FakeBackend::new());
        let ruby = submit(&setup.router, "ruby", "puts 1").await;

        let cases = [
            (serde_json::json!({}), StatusCode::BAD_REQUEST),
            (serde_json::json!({ "functionId": 99 }), StatusCode::NOT_FOUND),
            (serde_json::json!({ "functionId": ruby }), StatusCode::BAD_REQUEST),
        ];
        for (body, status) in cases {
            let response = setup
                .router
                .clone()
                .oneshot(json_request("POST", "/execute", body))
                .await
                .unwrap();
            assert_eq!(response.status(), status);
        }
    }

    #[tokio::test]
    async fn test_build_failure_is_500() {
        let setup = setup_router(FakeBackend::new().with_failing_builds("base image missing"));
        let id = submit(&setup.router, "python", "print(1)").await;

        let response = setup
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/execute",
                serde_json::json!({ "functionId": id }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Docker build failed");
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_fields() {
        let setup = setup_router(FakeBackend::new());

        let response = setup
            .router
            .oneshot(json_request(
                "POST",
                "/submit-function",
                serde_json::json!({ "title": "only a title" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_function_crud() {
        let setup = setup_router(FakeBackend::new());
        let id = submit(&setup.router, "python", "print(1)").await;

        let response = setup
            .router
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/functions/{id}"),
                serde_json::json!({ "code": "print(2)" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = setup
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/functions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["code"], "print(2)");

        let response = setup
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/functions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = setup
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/functions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_summary() {
        let setup = setup_router(FakeBackend::new());
        let id = submit(&setup.router, "python", "print('x')").await;

        for runtime in ["default", "gvisor", "gvisor"] {
            setup
                .router
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/execute",
                    serde_json::json!({ "functionId": id, "runtime": runtime }),
                ))
                .await
                .unwrap();
        }

        let response = setup
            .router
            .oneshot(
                Request::builder()
                    .uri("/metrics-summary")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["runtime"], "gvisor");
        assert_eq!(rows[1]["total_runs"], 2);
    }
}
