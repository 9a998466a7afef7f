// Cart, checkout, coupons at the till and order lifecycle

use chrono::Duration;
use gamespace::core::errors::GameError;
use gamespace::core::models::*;
use gamespace::services::admin::RightsChange;
use gamespace::services::shop::CheckoutRequest;
use gamespace::services::wallet::CouponTypeInput;

use super::common::*;

fn checkout_with(coupon_code: Option<String>) -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: "1 Market Street".to_string(),
        payment_method: "card".to_string(),
        coupon_code,
    }
}

/// A member holding a bought coupon worth 10 off a spend of 100
async fn member_with_coupon(app: &TestApp) -> (i64, String) {
    let admin = app.register_id("shopkeeper").await;
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;
    let coupon_type = app
        .state
        .wallet
        .create_coupon_type(
            admin,
            CouponTypeInput {
                name: "Ten off".to_string(),
                discount_type: DiscountType::Amount,
                discount_value: 10,
                min_spend: 100,
                valid_from: start_time() - Duration::days(1),
                valid_to: start_time() + Duration::days(30),
                points_cost: 0,
                is_active: true,
                description: None,
            },
        )
        .await
        .unwrap();
    let user = app.register_id("alice").await;
    let coupon = app.state.wallet.redeem_coupon(user, coupon_type.id).await.unwrap();
    (user, coupon.code)
}

#[tokio::test]
async fn test_cart_merges_and_respects_stock() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    let plush = app.product("Plush", 60, Some(5)).await;

    app.state.shop.add_to_cart(user, plush.id, 2).await.unwrap();
    let item = app.state.shop.add_to_cart(user, plush.id, 2).await.unwrap();
    assert_eq!(item.quantity, 4);

    let err = app.state.shop.add_to_cart(user, plush.id, 2).await.unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
    assert!(matches!(
        app.state.shop.add_to_cart(user, plush.id, 0).await,
        Err(GameError::Validation(_))
    ));

    let cart = app.state.shop.view_cart(user).await.unwrap();
    assert_eq!(cart.subtotal, 240);

    app.state.shop.update_cart_item(user, plush.id, 0).await.unwrap();
    assert!(app.state.shop.view_cart(user).await.unwrap().lines.is_empty());
}

#[tokio::test]
async fn test_cart_quantity_is_bounded() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    let ball = app.product("Ball", 15, None).await;

    assert!(matches!(
        app.state.shop.add_to_cart(user, ball.id, i64::MAX).await,
        Err(GameError::Validation(_))
    ));
    app.state.shop.add_to_cart(user, ball.id, 999).await.unwrap();
    assert!(matches!(
        app.state.shop.add_to_cart(user, ball.id, 1).await,
        Err(GameError::Validation(_))
    ));
    assert!(matches!(
        app.state.shop.update_cart_item(user, ball.id, 1000).await,
        Err(GameError::Validation(_))
    ));

    let cart = app.state.shop.view_cart(user).await.unwrap();
    assert_eq!(cart.lines[0].quantity, 999);
    assert_eq!(cart.subtotal, 15 * 999);
}

#[tokio::test]
async fn test_cart_total_overflow_is_rejected() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    let jewel = app.product("Jewel", i64::MAX / 2, None).await;

    app.state.shop.add_to_cart(user, jewel.id, 3).await.unwrap();
    assert!(matches!(
        app.state.shop.view_cart(user).await,
        Err(GameError::Validation(_))
    ));
}

#[tokio::test]
async fn test_checkout_with_coupon() {
    let app = TestApp::new();
    let (user, code) = member_with_coupon(&app).await;
    let plush = app.product("Plush", 60, Some(5)).await;
    let ball = app.product("Ball", 15, None).await;

    app.state.shop.add_to_cart(user, plush.id, 2).await.unwrap();
    app.state.shop.add_to_cart(user, ball.id, 1).await.unwrap();

    let detail = app
        .state
        .shop
        .checkout(user, checkout_with(Some(code.clone())))
        .await
        .unwrap();
    assert_eq!(detail.order.subtotal, 135);
    assert_eq!(detail.order.discount, 10);
    assert_eq!(detail.order.total, 125);
    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.items.len(), 2);

    assert_eq!(app.state.shop.get_product(plush.id).await.unwrap().stock, Some(3));
    assert_eq!(app.state.shop.get_product(ball.id).await.unwrap().stock, None);
    assert!(app.state.shop.view_cart(user).await.unwrap().lines.is_empty());
    assert!(app.state.wallet.coupons(user, false).await.unwrap().is_empty());

    // the coupon cannot pay for a second order
    app.state.shop.add_to_cart(user, plush.id, 2).await.unwrap();
    let err = app
        .state
        .shop
        .checkout(user, checkout_with(Some(code)))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
    // and the failed attempt left the stock alone
    assert_eq!(app.state.shop.get_product(plush.id).await.unwrap().stock, Some(3));
}

#[tokio::test]
async fn test_coupon_minimum_spend() {
    let app = TestApp::new();
    let (user, code) = member_with_coupon(&app).await;
    let ball = app.product("Ball", 15, None).await;
    app.state.shop.add_to_cart(user, ball.id, 1).await.unwrap();

    let err = app
        .state
        .shop
        .checkout(user, checkout_with(Some(code)))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Validation(_)));
}

#[tokio::test]
async fn test_empty_cart_and_disabled_shopping() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    assert!(matches!(
        app.state.shop.checkout(user, checkout_with(None)).await,
        Err(GameError::Validation(_))
    ));

    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;
    app.state
        .admin
        .set_user_rights(
            admin,
            user,
            RightsChange {
                shopping_permission: Some(false),
                ..RightsChange::default()
            },
        )
        .await
        .unwrap();

    let ball = app.product("Ball", 15, None).await;
    app.state.shop.add_to_cart(user, ball.id, 1).await.unwrap();
    assert!(matches!(
        app.state.shop.checkout(user, checkout_with(None)).await,
        Err(GameError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_cancel_restores_stock_and_coupon() {
    let app = TestApp::new();
    let (user, code) = member_with_coupon(&app).await;
    let plush = app.product("Plush", 60, Some(5)).await;
    app.state.shop.add_to_cart(user, plush.id, 2).await.unwrap();
    let detail = app
        .state
        .shop
        .checkout(user, checkout_with(Some(code)))
        .await
        .unwrap();

    let order = app.state.shop.cancel_order(user, detail.order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(app.state.shop.get_product(plush.id).await.unwrap().stock, Some(5));
    assert_eq!(app.state.wallet.coupons(user, false).await.unwrap().len(), 1);

    assert!(matches!(
        app.state.shop.cancel_order(user, detail.order.id).await,
        Err(GameError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_order_status_flow_notifies_owner() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    let admin = app.register_id("boss").await;
    let ball = app.product("Ball", 15, None).await;
    app.state.shop.add_to_cart(user, ball.id, 1).await.unwrap();
    let order = app
        .state
        .shop
        .checkout(user, checkout_with(None))
        .await
        .unwrap()
        .order;

    assert!(matches!(
        app.state.shop.set_status(admin, order.id, OrderStatus::Paid).await,
        Err(GameError::Forbidden(_))
    ));
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;

    app.state.shop.set_status(admin, order.id, OrderStatus::Paid).await.unwrap();
    assert!(matches!(
        app.state.shop.set_status(admin, order.id, OrderStatus::Completed).await,
        Err(GameError::Conflict(_))
    ));
    app.state
        .shop
        .set_status(admin, order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    assert!(app.state.shop.cancel_order(user, order.id).await.is_err());

    let inbox = app
        .state
        .notifications
        .list(user, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(inbox.total, 2);
    assert!(inbox.items.iter().all(|n| n.title == "Order update"));
}

#[tokio::test]
async fn test_orders_are_private() {
    let app = TestApp::new();
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    let ball = app.product("Ball", 15, None).await;
    app.state.shop.add_to_cart(alice, ball.id, 1).await.unwrap();
    let order = app
        .state
        .shop
        .checkout(alice, checkout_with(None))
        .await
        .unwrap()
        .order;

    assert!(matches!(
        app.state.shop.get_order(bob, order.id).await,
        Err(GameError::NotFound(_))
    ));
    app.grant(bob, &[Permission::CustomerService]).await;
    assert!(app.state.shop.get_order(bob, order.id).await.is_ok());
    assert_eq!(app.state.shop.list_orders(alice, PageRequest::default()).await.unwrap().total, 1);
}

#[tokio::test]
async fn test_soft_deleted_product_leaves_catalogue() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;
    let user = app.register_id("alice").await;
    let plush = app.product("Plush", 60, Some(5)).await;
    app.state.shop.add_to_cart(user, plush.id, 1).await.unwrap();

    // warm the cache first
    app.state.shop.get_product(plush.id).await.unwrap();
    app.state.shop.delete_product(admin, plush.id).await.unwrap();

    assert!(matches!(
        app.state.shop.get_product(plush.id).await,
        Err(GameError::NotFound(_))
    ));
    let cart = app.state.shop.view_cart(user).await.unwrap();
    assert!(!cart.lines[0].available);
    assert_eq!(cart.subtotal, 0);
}

#[tokio::test]
async fn test_product_search() {
    let app = TestApp::new();
    app.product("Red Ball", 15, None).await;
    app.product("Blue Ball", 40, None).await;
    app.product("Plush", 60, None).await;

    let found = app
        .state
        .shop
        .search("ball", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total, 2);

    let priced = app
        .state
        .shop
        .search_by_price(20, 60, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(priced.total, 2);
    assert!(app
        .state
        .shop
        .search_by_price(50, 10, PageRequest::default())
        .await
        .is_err());
}
