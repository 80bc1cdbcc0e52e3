//! Integration tests for the authentication middleware.
//!
//! The middleware trusts gateway-verified headers; these tests check that it
//! builds the identity correctly and rejects requests without a verified
//! email.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use tower::ServiceExt; // for `oneshot`

use podium_api::auth::auth_middleware;
use podium_core::identity::Identity;

async fn test_handler(
    axum::Extension(identity): axum::Extension<Identity>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "subject": identity.subject,
        "email": identity.email,
        "owner": identity.owner_key(),
        "roles": identity.roles,
        "groups": identity.groups,
    }))
}

fn create_test_app() -> Router {
    Router::new()
        .route("/protected", get(test_handler))
        .layer(middleware::from_fn(auth_middleware))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_verified_email_passes() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-email", "Alice@newpaltz.edu")
        .header("x-auth-subject", "sub-42")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["subject"], "sub-42");
    assert_eq!(json["email"], "Alice@newpaltz.edu");
    assert_eq!(json["owner"], "alice");
}

#[tokio::test]
async fn test_missing_email_returns_401() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-subject", "sub-42")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_email_returns_401() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-email", "")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forwarded_header_fallbacks() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-forwarded-email", "bob@example.org")
        .header("x-forwarded-user", "bob")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["subject"], "bob");
    assert_eq!(json["owner"], "bob");
}

#[tokio::test]
async fn test_auth_headers_take_priority_over_forwarded() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-email", "primary@example.org")
        .header("x-forwarded-email", "fallback@example.org")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["email"], "primary@example.org");
}

#[tokio::test]
async fn test_subject_defaults_to_email() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-email", "carol@example.org")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["subject"], "carol@example.org");
}

#[tokio::test]
async fn test_roles_and_groups_are_split_and_trimmed() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-email", "dave@example.org")
        .header("x-auth-roles", "student, admin ,")
        .header("x-auth-groups", "compsci-students")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["roles"], serde_json::json!(["student", "admin"]));
    assert_eq!(json["groups"], serde_json::json!(["compsci-students"]));
}

#[tokio::test]
async fn test_missing_roles_means_no_roles() {
    let app = create_test_app();

    let request = Request::builder()
        .uri("/protected")
        .header("x-auth-email", "erin@example.org")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["roles"], serde_json::json!([]));
    assert_eq!(json["groups"], serde_json::json!([]));
}
