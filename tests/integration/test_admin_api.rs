// Back-office endpoints and their permission gates

use axum::http::{Method, StatusCode};
use gamespace::core::models::Permission;
use serde_json::json;

use super::common::*;

#[tokio::test]
async fn test_member_gets_403_from_admin_routes() {
    let app = TestApp::new();
    let member = app.register("alice").await;
    let router = app.router();
    let token = Some(member.access_token.as_str());

    for (method, uri) in [
        (Method::GET, "/v1/admin/dashboard"),
        (Method::GET, "/v1/admin/users"),
        (Method::GET, "/v1/admin/roles"),
        (Method::GET, "/v1/admin/evouchers/redeem-logs"),
    ] {
        let (status, body) = call(&router, method, uri, token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert!(body["request_id"].is_string());
    }
}

#[tokio::test]
async fn test_admin_dashboard_and_points() {
    let app = TestApp::new();
    let admin = app.register("boss").await;
    app.grant(admin.user.id, &[Permission::AdministratorPrivilegesManagement]).await;
    let alice = app.register_id("alice").await;
    let router = app.router();
    let token = Some(admin.access_token.as_str());

    let uri = format!("/v1/admin/users/{}/points", alice);
    let (status, body) = call(
        &router,
        Method::POST,
        &uri,
        token,
        Some(json!({ "delta": 250, "reason": "Tournament prize" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 250);

    let (status, dashboard) = call(&router, Method::GET, "/v1/admin/dashboard", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["user_count"], 2);
    assert_eq!(dashboard["total_points"], 250);
}

#[tokio::test]
async fn test_lock_without_body_is_indefinite() {
    let app = TestApp::new();
    let admin = app.register("boss").await;
    app.grant(admin.user.id, &[Permission::UserStatusManagement]).await;
    let carol = app.register_id("carol").await;
    let router = app.router();
    let token = Some(admin.access_token.as_str());

    let uri = format!("/v1/admin/users/{}/lock", carol);
    let (status, body) = call(&router, Method::POST, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["lockout_end"].is_string());

    let (status, body) = call(
        &router,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "account": "carol", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status.as_u16(), 423);
    assert!(body["error"].as_str().unwrap().contains("locked"));

    let uri = format!("/v1/admin/users/{}/unlock", carol);
    let (status, _) = call(&router, Method::POST, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_role_lifecycle_over_http() {
    let app = TestApp::new();
    let admin = app.register("boss").await;
    app.grant(admin.user.id, &[Permission::AdministratorPrivilegesManagement]).await;
    let member = app.register("alice").await;
    let router = app.router();
    let token = Some(admin.access_token.as_str());

    let (status, role) = call(
        &router,
        Method::POST,
        "/v1/admin/roles",
        token,
        Some(json!({ "name": "Support", "permissions": ["CustomerService"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/admin/users/{}/roles/{}", member.user.id, role["id"]);
    let (status, body) = call(&router, Method::POST, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, roles) = call(
        &router,
        Method::GET,
        "/v1/me/roles",
        Some(&member.access_token),
        None,
    )
    .await;
    assert_eq!(roles[0]["name"], "Support");

    // the member's new permission opens the redeem log
    let (status, _) = call(
        &router,
        Method::GET,
        "/v1/admin/evouchers/redeem-logs",
        Some(&member.access_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&router, Method::DELETE, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
}

#[tokio::test]
async fn test_catalogue_administration() {
    let app = TestApp::new();
    let admin = app.register("boss").await;
    app.grant(admin.user.id, &[Permission::ShoppingPermissionManagement]).await;
    let router = app.router();
    let token = Some(admin.access_token.as_str());

    let (status, product) = call(
        &router,
        Method::POST,
        "/v1/admin/products",
        token,
        Some(json!({ "name": "Plush", "product_type": "toy", "price": 300, "stock": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/admin/products/{}/stock", product["id"]);
    let (status, updated) = call(&router, Method::PUT, &uri, token, Some(json!({ "stock": 9 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["stock"], 9);

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/admin/coupon-types",
        token,
        Some(json!({
            "name": "Spring sale",
            "discount_type": "Percent",
            "discount_value": 20,
            "valid_from": "2024-03-01T00:00:00Z",
            "valid_to": "2024-04-01T00:00:00Z",
            "points_cost": 150,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, catalogue) = call(&router, Method::GET, "/v1/catalogue/coupon-types", None, None).await;
    assert_eq!(catalogue.as_array().map(Vec::len), Some(1));
    assert_eq!(catalogue[0]["name"], "Spring sale");

    let uri = format!("/v1/admin/products/{}", product["id"]);
    let (status, _) = call(&router, Method::DELETE, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/v1/products/{}", product["id"]);
    let (status, _) = call(&router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_evoucher_scan_over_http() {
    let app = TestApp::new();
    let staff = app.register("staff").await;
    app.grant(
        staff.user.id,
        &[Permission::ShoppingPermissionManagement, Permission::CustomerService],
    )
    .await;
    let member = app.register("alice").await;
    app.fund(member.user.id, 500).await;
    let router = app.router();
    let staff_token = Some(staff.access_token.as_str());
    let member_token = Some(member.access_token.as_str());

    let (status, kind) = call(
        &router,
        Method::POST,
        "/v1/admin/evoucher-types",
        staff_token,
        Some(json!({
            "name": "Coffee",
            "value_amount": 120,
            "points_cost": 300,
            "total_available": 5,
            "valid_from": "2024-03-01T00:00:00Z",
            "valid_to": "2024-04-01T00:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, voucher) = call(
        &router,
        Method::POST,
        "/v1/wallet/evouchers/redeem",
        member_token,
        Some(json!({ "evoucher_type_id": kind["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/wallet/evouchers/{}/token", voucher["code"].as_str().unwrap());
    let (status, pass) = call(&router, Method::POST, &uri, member_token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, approval) = call(
        &router,
        Method::POST,
        "/v1/admin/evouchers/scan",
        staff_token,
        Some(json!({ "token": pass["token"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approval["status"], "Approved");
    assert_eq!(approval["value_amount"], 120);

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/admin/evouchers/scan",
        staff_token,
        Some(json!({ "token": "no-such-token" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, logs) = call(&router, Method::GET, "/v1/admin/evouchers/redeem-logs", staff_token, None).await;
    assert_eq!(logs["total"], 2);
}
