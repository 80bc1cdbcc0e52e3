//! Surface-level API tests that never reach the container runtime: request
//! validation and routing behavior that fails before any engine call.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use podium_api::{create_app, AppState};
use podium_orchestrator::OrchestratorConfig;
use podium_runtime::RuntimeClient;

fn test_app(cluster_mode: bool) -> Router {
    // The client is lazy; nothing here dials the socket.
    let runtime = RuntimeClient::connect().unwrap();
    let state = AppState::new(runtime, OrchestratorConfig::default());
    create_app(state, cluster_mode)
}

fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header("x-auth-email", "alice@example.edu")
}

#[tokio::test]
async fn test_health_is_open() {
    let response = test_app(false)
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_workspaces_require_auth() {
    let response = test_app(false)
        .oneshot(
            Request::builder()
                .uri("/api/v1/workspaces")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_preset_is_rejected() {
    let response = test_app(false)
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/workspaces")
                    .header("content-type", "application/json"),
            )
            .body(Body::from(
                serde_json::json!({ "project": "proj1", "preset": "mainframe" }).to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("mainframe"));
}

#[tokio::test]
async fn test_invalid_project_name_is_rejected() {
    let response = test_app(false)
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/workspaces")
                    .header("content-type", "application/json"),
            )
            .body(Body::from(
                serde_json::json!({ "project": "Bad Name!", "preset": "notebook" }).to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cluster_routes_absent_without_cluster_mode() {
    let response = test_app(false)
        .oneshot(
            authed(Request::builder().uri("/api/v1/cluster/workspaces"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
