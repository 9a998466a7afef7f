// Router plumbing: health, metrics, headers, request ids, limits

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use gamespace::api::AppState;
use gamespace::config::Config;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;

static_assertions::assert_impl_all!(AppState: Send, Sync, Clone);

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();
    let (status, body) = call(&app.router(), Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_metrics_count_responses() {
    let app = TestApp::new();
    let router = app.router();
    call(&router, Method::GET, "/health", None, None).await;
    call(&router, Method::GET, "/v1/wallet", None, None).await;

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("gamespace_http_requests_total{status=\"2xx\"} 1"));
    assert!(text.contains("gamespace_http_requests_total{status=\"4xx\"} 1"));
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "no-referrer");
    let request_id = headers["x-request-id"].to_str().unwrap();
    assert_eq!(request_id.len(), 36);
}

#[tokio::test]
async fn test_error_body_carries_caller_request_id() {
    let app = TestApp::new();
    let response = app
        .router()
        .oneshot(
            Request::get("/v1/products/424242")
                .header("x-request-id", "trace-me-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "trace-me-42");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Product not found");
    assert_eq!(body["request_id"], "trace-me-42");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = Config::test_config();
    config.body_size_limit_bytes = 64;
    let app = TestApp::with_config(config);

    let payload = json!({
        "account": "alice",
        "email": "alice@example.com",
        "password": "x".repeat(200),
    })
    .to_string();
    let response = app
        .router()
        .oneshot(
            Request::post("/v1/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, payload.len())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new();
    let (status, _) = call(&app.router(), Method::GET, "/v1/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
