// Points ledger, transfers, coupons and e-vouchers

use chrono::Duration;
use gamespace::core::errors::GameError;
use gamespace::core::models::*;
use gamespace::services::ledger::Entry;
use gamespace::services::wallet::{CouponTypeInput, EVoucherTypeInput};

use super::common::*;

fn coupon_input(points_cost: i64) -> CouponTypeInput {
    CouponTypeInput {
        name: "Ten off".to_string(),
        discount_type: DiscountType::Amount,
        discount_value: 10,
        min_spend: 100,
        valid_from: start_time() - Duration::days(1),
        valid_to: start_time() + Duration::days(30),
        points_cost,
        is_active: true,
        description: None,
    }
}

fn evoucher_input(total_available: i64) -> EVoucherTypeInput {
    EVoucherTypeInput {
        name: "Coffee".to_string(),
        value_amount: 120,
        points_cost: 300,
        total_available,
        valid_from: start_time() - Duration::days(1),
        valid_to: start_time() + Duration::days(30),
        is_active: true,
        description: None,
    }
}

#[tokio::test]
async fn test_debit_never_goes_negative() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.fund(user, 100).await;

    let err = app
        .state
        .wallet
        .debit(user, 150, Entry::new(ChangeType::Point, "Too much"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GameError::InsufficientPoints { required: 150, available: 100 }
    ));
    assert_eq!(app.balance(user).await, 100);

    let left = app
        .state
        .wallet
        .debit(user, 100, Entry::new(ChangeType::Point, "All of it"))
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn test_transfer_moves_points_and_writes_both_histories() {
    let app = TestApp::new();
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    app.fund(alice, 500).await;

    let receipt = app.state.wallet.transfer(alice, bob, 200, "").await.unwrap();
    assert_eq!(receipt.from_balance, 300);
    assert_eq!(app.balance(bob).await, 200);

    let history = app
        .state
        .wallet
        .history(bob, PageRequest::default())
        .await
        .unwrap();
    let line = &history.items[0];
    assert_eq!(line.change_type, ChangeType::Transfer);
    assert_eq!(line.points_changed, 200);
    assert_eq!(line.description, format!("Points transfer (From User {})", alice));

    let history = app
        .state
        .wallet
        .history(alice, PageRequest::default())
        .await
        .unwrap();
    assert!(history
        .items
        .iter()
        .any(|h| h.points_changed == -200 && h.description.ends_with(&format!("(To User {})", bob))));
}

#[tokio::test]
async fn test_transfer_rejections_leave_balances_alone() {
    let app = TestApp::new();
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    app.fund(alice, 50).await;

    let wallet = &app.state.wallet;
    assert!(matches!(
        wallet.transfer(alice, alice, 10, "").await,
        Err(GameError::Validation(_))
    ));
    assert!(matches!(
        wallet.transfer(alice, bob, 0, "").await,
        Err(GameError::Validation(_))
    ));
    assert!(matches!(
        wallet.transfer(alice, bob, 51, "").await,
        Err(GameError::InsufficientPoints { .. })
    ));
    assert!(matches!(
        wallet.transfer(alice, 9999, 10, "").await,
        Err(GameError::NotFound(_))
    ));
    assert_eq!(app.balance(alice).await, 50);
    assert_eq!(app.balance(bob).await, 0);
}

#[tokio::test]
async fn test_redeem_coupon_charges_points() {
    let app = TestApp::new();
    let admin = app.register_id("admin").await;
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;
    let user = app.register_id("alice").await;
    app.fund(user, 250).await;

    let coupon_type = app
        .state
        .wallet
        .create_coupon_type(admin, coupon_input(200))
        .await
        .unwrap();
    let coupon = app.state.wallet.redeem_coupon(user, coupon_type.id).await.unwrap();
    assert_eq!(app.balance(user).await, 50);
    assert_eq!(coupon.expires_at, coupon_type.valid_to);

    let owned = app.state.wallet.coupons(user, false).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].type_name, "Ten off");

    // second redemption cannot be paid for and leaves no coupon behind
    assert!(app.state.wallet.redeem_coupon(user, coupon_type.id).await.is_err());
    assert_eq!(app.state.wallet.coupons(user, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_inactive_coupon_type_not_redeemable() {
    let app = TestApp::new();
    let admin = app.register_id("admin").await;
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;
    let user = app.register_id("alice").await;

    let mut input = coupon_input(0);
    input.is_active = false;
    let coupon_type = app.state.wallet.create_coupon_type(admin, input).await.unwrap();

    assert!(matches!(
        app.state.wallet.redeem_coupon(user, coupon_type.id).await,
        Err(GameError::Conflict(_))
    ));
    assert!(app.state.wallet.coupon_catalogue().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_coupon_type_admin_requires_permission() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    assert!(matches!(
        app.state.wallet.create_coupon_type(user, coupon_input(10)).await,
        Err(GameError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_evoucher_sells_out() {
    let app = TestApp::new();
    let admin = app.register_id("admin").await;
    app.grant(admin, &[Permission::ShoppingPermissionManagement]).await;
    let user = app.register_id("alice").await;
    app.fund(user, 1000).await;

    let kind = app
        .state
        .wallet
        .create_evoucher_type(admin, evoucher_input(1))
        .await
        .unwrap();
    app.state.wallet.redeem_evoucher(user, kind.id).await.unwrap();
    assert!(matches!(
        app.state.wallet.redeem_evoucher(user, kind.id).await,
        Err(GameError::Conflict(_))
    ));
    assert_eq!(app.balance(user).await, 700);
}

#[tokio::test]
async fn test_evoucher_token_scan() {
    let app = TestApp::new();
    let admin = app.register_id("admin").await;
    app.grant(
        admin,
        &[Permission::ShoppingPermissionManagement, Permission::CustomerService],
    )
    .await;
    let user = app.register_id("alice").await;
    app.fund(user, 1000).await;

    let kind = app
        .state
        .wallet
        .create_evoucher_type(admin, evoucher_input(10))
        .await
        .unwrap();
    let voucher = app.state.wallet.redeem_evoucher(user, kind.id).await.unwrap();

    let first = app
        .state
        .wallet
        .issue_evoucher_token(user, &voucher.code)
        .await
        .unwrap();
    let second = app
        .state
        .wallet
        .issue_evoucher_token(user, &voucher.code)
        .await
        .unwrap();

    // a newer token revokes the older one
    assert!(matches!(
        app.state.wallet.scan_evoucher_token(admin, &first.token).await,
        Err(GameError::Conflict(_))
    ));
    // members cannot scan
    assert!(matches!(
        app.state.wallet.scan_evoucher_token(user, &second.token).await,
        Err(GameError::Forbidden(_))
    ));

    let approval = app
        .state
        .wallet
        .scan_evoucher_token(admin, &second.token)
        .await
        .unwrap();
    assert_eq!(approval.status, RedeemStatus::Approved);
    assert_eq!(approval.value_amount, 120);
    assert_eq!(approval.user_id, user);

    // used now, so the same token is refused as already used
    let err = app
        .state
        .wallet
        .scan_evoucher_token(admin, &second.token)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Conflict(ref m) if m.contains("already used")));

    let logs = app
        .state
        .wallet
        .redeem_logs(admin, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(logs.total, 3);
    assert!(logs.items.iter().any(|l| l.status == RedeemStatus::Approved));
    assert!(logs.items.iter().any(|l| l.status == RedeemStatus::Revoked));
    assert!(logs.items.iter().any(|l| l.status == RedeemStatus::AlreadyUsed));
}

#[tokio::test]
async fn test_evoucher_token_expires() {
    let app = TestApp::new();
    let admin = app.register_id("admin").await;
    app.grant(
        admin,
        &[Permission::ShoppingPermissionManagement, Permission::CustomerService],
    )
    .await;
    let user = app.register_id("alice").await;
    app.fund(user, 300).await;

    let kind = app
        .state
        .wallet
        .create_evoucher_type(admin, evoucher_input(10))
        .await
        .unwrap();
    let voucher = app.state.wallet.redeem_evoucher(user, kind.id).await.unwrap();
    let pass = app
        .state
        .wallet
        .issue_evoucher_token(user, &voucher.code)
        .await
        .unwrap();

    app.clock.advance(Duration::minutes(6));
    assert!(matches!(
        app.state.wallet.scan_evoucher_token(admin, &pass.token).await,
        Err(GameError::Conflict(_))
    ));
    // the voucher itself is still usable
    assert!(app.state.wallet.use_evoucher(user, &voucher.code).await.is_ok());
}

#[tokio::test]
async fn test_leaderboard_orders_by_points() {
    let app = TestApp::new();
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    app.fund(alice, 10).await;
    app.fund(bob, 90).await;

    let board = app.state.wallet.leaderboard(10).await.unwrap();
    assert_eq!(board[0].user_id, bob);
    assert_eq!(board[0].points, 90);
    assert_eq!(board[1].user_id, alice);
}
