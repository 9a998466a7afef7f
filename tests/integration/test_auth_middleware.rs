// Bearer token handling on protected routes

use axum::http::{Method, StatusCode};
use chrono::Duration;
use serde_json::json;

use super::common::*;

#[tokio::test]
async fn test_missing_token_is_401() {
    let app = TestApp::new();
    let (status, body) = call(&app.router(), Method::GET, "/v1/me", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing bearer token");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_garbage_token_is_401() {
    let app = TestApp::new();
    let (status, _) = call(
        &app.router(),
        Method::GET,
        "/v1/wallet",
        Some("not.a.jwt"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_reaches_handler() {
    let app = TestApp::new();
    let tokens = app.register("alice").await;

    let (status, body) = call(
        &app.router(),
        Method::GET,
        "/v1/me",
        Some(&tokens.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account"], "alice");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_expired_token_is_401() {
    let app = TestApp::new();
    let tokens = app.register("alice").await;
    app.clock.advance(Duration::days(2));

    let (status, _) = call(
        &app.router(),
        Method::GET,
        "/v1/me",
        Some(&tokens.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_user_token_stops_working() {
    let app = TestApp::new();
    let tokens = app.register("alice").await;
    let admin = app.register("boss").await;
    app.grant(
        admin.user.id,
        &[gamespace::core::models::Permission::UserStatusManagement],
    )
    .await;
    let router = app.router();

    let uri = format!("/v1/admin/users/{}/rights", tokens.user.id);
    let (status, _) = call(
        &router,
        Method::PUT,
        &uri,
        Some(&admin.access_token),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&router, Method::GET, "/v1/me", Some(&tokens.access_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_routes_need_no_token() {
    let app = TestApp::new();
    let router = app.router();
    for uri in [
        "/v1/leaderboard",
        "/v1/products",
        "/v1/catalogue/coupon-types",
        "/v1/catalogue/evoucher-types",
    ] {
        let (status, _) = call(&router, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }
}
