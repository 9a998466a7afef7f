// A member's day, end to end over HTTP

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use super::common::*;

async fn register_over_http(router: &axum::Router, account: &str) -> (String, i64) {
    let (status, body) = call(
        router,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "account": account,
            "email": format!("{}@example.com", account),
            "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn test_register_login_refresh_logout() {
    let app = TestApp::new();
    let router = app.router();
    register_over_http(&router, "alice").await;

    let (status, body) = call(
        &router,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "account": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, login) = call(
        &router,
        Method::POST,
        "/v1/auth/login",
        None,
        Some(json!({ "account": "alice", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["token_type"], "Bearer");
    let refresh_token = login["refresh_token"].as_str().unwrap();

    let (status, rotated) = call(
        &router,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let next = rotated["refresh_token"].as_str().unwrap();

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/auth/logout",
        None,
        Some(json!({ "refresh_token": next })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": next })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_registration_is_409() {
    let app = TestApp::new();
    let router = app.router();
    register_over_http(&router, "alice").await;

    let (status, body) = call(
        &router,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "account": "alice",
            "email": "second@example.com",
            "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_pet_sign_in_and_game_day() {
    let app = TestApp::new();
    let router = app.router();
    let (token, _) = register_over_http(&router, "alice").await;
    let token = Some(token.as_str());

    let (status, pet) = call(
        &router,
        Method::POST,
        "/v1/pet",
        token,
        Some(json!({ "name": "Mochi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pet["health"], 100);

    let (status, record) = call(&router, Method::POST, "/v1/signin", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["points_gained"], 20);
    let (status, _) = call(&router, Method::POST, "/v1/signin", token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, game) = call(
        &router,
        Method::POST,
        "/v1/games/start",
        token,
        Some(json!({ "level": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/v1/games/{}/finish", game["id"]);
    let (status, finished) = call(
        &router,
        Method::POST,
        &uri,
        token,
        Some(json!({ "result": "Win" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["points_gained"], 44);

    let (_, remaining) = call(&router, Method::GET, "/v1/games/remaining", token, None).await;
    assert_eq!(remaining["remaining"], 2);

    let (status, wallet) = call(&router, Method::GET, "/v1/wallet", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["points"], 64);

    let (status, history) = call(&router, Method::GET, "/v1/wallet/history", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 2);

    let (status, body) = call(&router, Method::PUT, "/v1/pet/skin", token, Some(json!({ "color": "#112233" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Insufficient points");
}

#[tokio::test]
async fn test_transfer_and_leaderboard() {
    let app = TestApp::new();
    let router = app.router();
    let (alice, alice_id) = register_over_http(&router, "alice").await;
    let (_, bob_id) = register_over_http(&router, "bob").await;
    app.fund(alice_id, 100).await;

    let (status, receipt) = call(
        &router,
        Method::POST,
        "/v1/wallet/transfer",
        Some(&alice),
        Some(json!({ "to_user_id": bob_id, "points": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["from_balance"], 40);

    let (status, board) = call(&router, Method::GET, "/v1/leaderboard?limit=1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0]["user_id"], bob_id);
}

#[tokio::test]
async fn test_forum_thread_over_http() {
    let app = TestApp::new();
    let router = app.router();
    let forum = app.forum("General").await;
    let (token, _) = register_over_http(&router, "alice").await;
    let token = Some(token.as_str());

    let (status, _) = call(&router, Method::GET, "/v1/forums", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let uri = format!("/v1/forums/{}/threads", forum.id);
    let (status, created) = call(
        &router,
        Method::POST,
        &uri,
        token,
        Some(json!({ "title": "Hello", "content": "First post" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let thread_id = created["thread"]["id"].as_i64().unwrap();
    let post_id = created["first_post"]["id"].as_i64().unwrap();

    let uri = format!("/v1/threads/{}/posts", thread_id);
    let (status, _) = call(&router, Method::POST, &uri, token, Some(json!({ "content": "A reply" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, posts) = call(&router, Method::GET, &uri, token, None).await;
    assert_eq!(posts["total"], 2);

    let uri = format!("/v1/posts/{}/reactions", post_id);
    let (status, _) = call(&router, Method::POST, &uri, token, Some(json!({ "kind": "like" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, reactions) = call(&router, Method::GET, &uri, token, None).await;
    assert_eq!(reactions.as_array().map(Vec::len), Some(1));

    let (status, found) = call(&router, Method::GET, "/v1/search/posts?q=reply", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["total"], 1);
}

#[tokio::test]
async fn test_shopping_over_http() {
    let app = TestApp::new();
    let router = app.router();
    let plush = app.product("Plush", 60, Some(2)).await;
    let (token, _) = register_over_http(&router, "alice").await;
    let token = Some(token.as_str());

    let uri = format!("/v1/products/{}", plush.id);
    let (status, product) = call(&router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["stock"], 2);

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/cart/items",
        token,
        Some(json!({ "product_id": plush.id, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/cart/items",
        token,
        Some(json!({ "product_id": plush.id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, cart) = call(&router, Method::GET, "/v1/cart", token, None).await;
    assert_eq!(cart["subtotal"], 120);

    let (status, order) = call(
        &router,
        Method::POST,
        "/v1/checkout",
        token,
        Some(json!({ "shipping_address": "1 Market Street", "payment_method": "card" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "Pending");
    assert_eq!(order["total"], 120);
    assert_eq!(order["items"].as_array().map(Vec::len), Some(1));

    let (_, product) = call(&router, Method::GET, &uri, None, None).await;
    assert_eq!(product["stock"], 0);

    let cancel = format!("/v1/orders/{}/cancel", order["id"]);
    let (status, cancelled) = call(&router, Method::POST, &cancel, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "Cancelled");

    let (status, body) = call(&router, Method::GET, "/v1/products/search", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_notifications_over_http() {
    let app = TestApp::new();
    let router = app.router();
    let (token, user_id) = register_over_http(&router, "alice").await;
    app.state.pets.create(user_id, "Mochi").await.unwrap();
    // level 10 win levels the pet up and pays a coupon, two notifications
    let game = app.state.games.start(user_id, 10).await.unwrap();
    app.state
        .games
        .finish(user_id, game.id, gamespace::core::models::GameOutcome::Win)
        .await
        .unwrap();
    let token = Some(token.as_str());

    let (_, count) = call(&router, Method::GET, "/v1/notifications/unread-count", token, None).await;
    assert_eq!(count["count"], 2);

    let (_, list) = call(&router, Method::GET, "/v1/notifications?unread_only=true", token, None).await;
    let first: &Value = &list["items"][0];
    let uri = format!("/v1/notifications/{}/read", first["id"]);
    let (status, _) = call(&router, Method::POST, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, count) = call(&router, Method::GET, "/v1/notifications/unread-count", token, None).await;
    assert_eq!(count["count"], 1);
    let (status, _) = call(&router, Method::POST, "/v1/notifications/read-all", token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, count) = call(&router, Method::GET, "/v1/notifications/unread-count", token, None).await;
    assert_eq!(count["count"], 0);
}
