// Back-office: RBAC, user status, rights, point adjustments and dashboard

use chrono::Duration;
use gamespace::core::errors::GameError;
use gamespace::core::models::{ChangeType, PageRequest, Permission};
use gamespace::services::admin::RightsChange;

use super::common::*;

#[tokio::test]
async fn test_members_have_no_back_office() {
    let app = TestApp::new();
    let member = app.register_id("alice").await;
    let other = app.register_id("bob").await;

    assert!(matches!(app.state.admin.dashboard(member).await, Err(GameError::Forbidden(_))));
    assert!(matches!(
        app.state.admin.list_users(member, PageRequest::default()).await,
        Err(GameError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.admin.lock_user(member, other, None).await,
        Err(GameError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.admin.adjust_points(member, other, 100, "gift").await,
        Err(GameError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.rbac.create_role(member, "Sneaky", vec![Permission::CustomerService]).await,
        Err(GameError::Forbidden(_))
    ));
    assert!(app.state.rbac.permissions_of(member).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_any_permission_lists_users() {
    let app = TestApp::new();
    let support = app.register_id("support").await;
    app.register_id("alice").await;
    app.grant(support, &[Permission::CustomerService]).await;

    let users = app
        .state
        .admin
        .list_users(support, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(users.total, 2);
}

#[tokio::test]
async fn test_lock_and_unlock() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::UserStatusManagement]).await;
    app.register_id("alice").await;
    let alice = app
        .state
        .accounts
        .login("alice", PASSWORD, None)
        .await
        .unwrap()
        .user
        .id;

    assert!(matches!(
        app.state
            .admin
            .lock_user(admin, alice, Some(start_time() - Duration::hours(1)))
            .await,
        Err(GameError::Validation(_))
    ));

    let locked = app.state.admin.lock_user(admin, alice, None).await.unwrap();
    assert!(locked.lockout_end.unwrap() > start_time() + Duration::days(365 * 50));
    assert!(matches!(
        app.state.accounts.login("alice", PASSWORD, None).await,
        Err(GameError::Locked)
    ));

    app.state.admin.unlock_user(admin, alice).await.unwrap();
    assert!(app.state.accounts.login("alice", PASSWORD, None).await.is_ok());
}

#[tokio::test]
async fn test_timed_lock_expires() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::UserStatusManagement]).await;
    let alice = app.register_id("alice").await;

    app.state
        .admin
        .lock_user(admin, alice, Some(start_time() + Duration::hours(2)))
        .await
        .unwrap();
    assert!(app.state.accounts.login("alice", PASSWORD, None).await.is_err());
    app.clock.advance(Duration::hours(3));
    assert!(app.state.accounts.login("alice", PASSWORD, None).await.is_ok());
}

#[tokio::test]
async fn test_each_right_needs_its_own_permission() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::UserStatusManagement]).await;
    let alice = app.register_id("alice").await;

    let err = app
        .state
        .admin
        .set_user_rights(
            admin,
            alice,
            RightsChange {
                is_active: Some(false),
                shopping_permission: Some(false),
                ..RightsChange::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Forbidden(_)));
    assert!(matches!(
        app.state.admin.set_user_rights(admin, alice, RightsChange::default()).await,
        Err(GameError::Validation(_))
    ));

    let changed = app
        .state
        .admin
        .set_user_rights(
            admin,
            alice,
            RightsChange {
                is_active: Some(false),
                ..RightsChange::default()
            },
        )
        .await
        .unwrap();
    assert!(!changed.is_active);
    assert!(changed.shopping_permission);

    // deactivated accounts cannot sign in
    assert!(app.state.accounts.login("alice", PASSWORD, None).await.is_err());
}

#[tokio::test]
async fn test_adjust_points() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::AdministratorPrivilegesManagement]).await;
    let alice = app.register_id("alice").await;

    assert_eq!(app.state.admin.adjust_points(admin, alice, 300, "Event prize").await.unwrap(), 300);
    assert_eq!(app.state.admin.adjust_points(admin, alice, -100, "Correction").await.unwrap(), 200);
    assert!(matches!(
        app.state.admin.adjust_points(admin, alice, -500, "Too much").await,
        Err(GameError::InsufficientPoints { .. })
    ));
    assert!(matches!(
        app.state.admin.adjust_points(admin, alice, 0, "Nothing").await,
        Err(GameError::Validation(_))
    ));
    assert!(matches!(
        app.state.admin.adjust_points(admin, alice, 10, "  ").await,
        Err(GameError::Validation(_))
    ));

    let history = app
        .state
        .wallet
        .history(alice, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.total, 2);
    assert!(history
        .items
        .iter()
        .all(|h| h.change_type == ChangeType::Point && h.description.starts_with("Admin adjustment")));
}

#[tokio::test]
async fn test_dashboard_counts() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::AdministratorPrivilegesManagement]).await;
    let alice = app.register_id("alice").await;
    app.fund(alice, 75).await;
    app.state.signin.sign_in(alice).await.unwrap();

    let dashboard = app.state.admin.dashboard(admin).await.unwrap();
    assert_eq!(dashboard.user_count, 2);
    assert_eq!(dashboard.total_points, 95);
    assert_eq!(dashboard.sign_ins_today, 1);
    assert_eq!(dashboard.games_today, 0);
}

#[tokio::test]
async fn test_role_management() {
    let app = TestApp::new();
    let admin = app.register_id("boss").await;
    app.grant(admin, &[Permission::AdministratorPrivilegesManagement]).await;
    let alice = app.register_id("alice").await;

    let role = app
        .state
        .rbac
        .create_role(
            admin,
            "Support",
            vec![Permission::CustomerService, Permission::CustomerService],
        )
        .await
        .unwrap();
    assert_eq!(role.permissions, vec![Permission::CustomerService]);
    assert!(matches!(
        app.state.rbac.create_role(admin, "Support", vec![]).await,
        Err(GameError::Conflict(_))
    ));

    assert!(app.state.rbac.assign_role(admin, alice, role.id).await.unwrap());
    assert!(!app.state.rbac.assign_role(admin, alice, role.id).await.unwrap());
    assert!(app
        .state
        .rbac
        .has_permission(alice, Permission::CustomerService)
        .await
        .unwrap());

    app.state
        .rbac
        .update_role(
            admin,
            role.id,
            None,
            Some(vec![Permission::CustomerService, Permission::PetRightsManagement]),
        )
        .await
        .unwrap();
    assert!(app
        .state
        .rbac
        .has_all(alice, &[Permission::CustomerService, Permission::PetRightsManagement])
        .await
        .unwrap());

    assert!(app.state.rbac.revoke_role(admin, alice, role.id).await.unwrap());
    assert!(!app
        .state
        .rbac
        .has_any(alice, Permission::ALL)
        .await
        .unwrap());
    assert!(matches!(
        app.state.rbac.assign_role(admin, alice, 9999).await,
        Err(GameError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_support_sends_notifications() {
    let app = TestApp::new();
    let support = app.register_id("support").await;
    let alice = app.register_id("alice").await;

    assert!(matches!(
        app.state.notifications.send(support, alice, "Hi", "Hello").await,
        Err(GameError::Forbidden(_))
    ));
    app.grant(support, &[Permission::CustomerService]).await;
    let sent = app
        .state
        .notifications
        .send(support, alice, "Maintenance", "Tonight at 22:00")
        .await
        .unwrap();

    assert_eq!(app.state.notifications.unread_count(alice).await.unwrap(), 1);
    // someone else's notification is invisible
    assert!(matches!(
        app.state.notifications.mark_read(support, sent.id).await,
        Err(GameError::NotFound(_))
    ));
    let read = app.state.notifications.mark_read(alice, sent.id).await.unwrap();
    assert!(read.is_read);
    assert_eq!(app.state.notifications.unread_count(alice).await.unwrap(), 0);
    assert_eq!(app.state.notifications.mark_all_read(alice).await.unwrap(), 0);
}
