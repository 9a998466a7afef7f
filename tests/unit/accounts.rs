// Registration, login lockout, token rotation and password reset

use chrono::Duration;
use gamespace::core::errors::GameError;
use gamespace::services::accounts::Registration;

use super::common::*;

fn last_code(body: &str) -> String {
    body.rsplit(": ").next().unwrap().trim().to_string()
}

#[tokio::test]
async fn test_register_creates_wallet_and_confirmation_email() {
    let app = TestApp::new();
    let tokens = app.register("alice").await;

    assert_eq!(tokens.token_type, "Bearer");
    assert!(!tokens.user.email_confirmed);
    assert!(tokens.user.last_login_at.is_none());
    assert_eq!(app.balance(tokens.user.id).await, 0);

    let emails = app.emails_to("alice@example.com").await;
    assert_eq!(emails.len(), 1);
    assert!(emails[0].subject.contains("Confirm"));
}

#[tokio::test]
async fn test_duplicate_account_rejected_case_insensitively() {
    let app = TestApp::new();
    app.register("alice").await;

    let err = app
        .state
        .accounts
        .register(Registration {
            account: "ALICE",
            email: "other@example.com",
            nickname: "A",
            password: PASSWORD,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
}

#[tokio::test]
async fn test_register_validates_fields() {
    let app = TestApp::new();
    let cases = [
        ("ab", "a@example.com", PASSWORD),
        ("bad name", "a@example.com", PASSWORD),
        ("goodname", "not-an-email", PASSWORD),
        ("goodname", "a@example.com", "short"),
    ];
    for (account, email, password) in cases {
        let result = app
            .state
            .accounts
            .register(Registration {
                account,
                email,
                nickname: "Nick",
                password,
            })
            .await;
        assert!(
            matches!(result, Err(GameError::Validation(_))),
            "{} / {} should be rejected",
            account,
            email
        );
    }
}

#[tokio::test]
async fn test_repeated_failures_lock_the_account() {
    let app = TestApp::new();
    app.register("bob").await;
    let accounts = &app.state.accounts;

    for _ in 0..4 {
        let err = accounts.login("bob", "wrong-password", None).await.unwrap_err();
        assert!(matches!(err, GameError::Unauthorized(_)));
    }
    // fifth failure locks
    assert!(accounts.login("bob", "wrong-password", None).await.is_err());
    let err = accounts.login("bob", PASSWORD, None).await.unwrap_err();
    assert!(matches!(err, GameError::Locked));

    app.clock.advance(Duration::minutes(16));
    assert!(accounts.login("bob", PASSWORD, Some("203.0.113.9")).await.is_ok());
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = TestApp::new();
    let tokens = app.register("carol").await;

    let rotated = app.state.accounts.refresh(&tokens.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, tokens.refresh_token);

    let err = app.state.accounts.refresh(&tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, GameError::Unauthorized(_)));

    app.state.accounts.logout(&rotated.refresh_token).await.unwrap();
    assert!(app.state.accounts.refresh(&rotated.refresh_token).await.is_err());
}

#[tokio::test]
async fn test_access_token_expires() {
    let app = TestApp::new();
    let tokens = app.register("dave").await;
    assert!(app.state.accounts.authenticate(&tokens.access_token).await.is_ok());

    app.clock.advance(Duration::hours(25));
    let err = app
        .state
        .accounts
        .authenticate(&tokens.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Unauthorized(_)));
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new();
    let tokens = app.register("erin").await;

    // unknown addresses look the same to the caller
    app.state
        .accounts
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();

    app.state
        .accounts
        .request_password_reset("erin@example.com")
        .await
        .unwrap();
    let emails = app.emails_to("erin@example.com").await;
    let reset = emails.iter().find(|e| e.subject.contains("Reset")).unwrap();
    let code = last_code(&reset.body);

    app.state
        .accounts
        .reset_password(&code, "brand-new-password")
        .await
        .unwrap();
    assert!(app.state.accounts.login("erin", PASSWORD, None).await.is_err());
    assert!(app
        .state
        .accounts
        .login("erin", "brand-new-password", None)
        .await
        .is_ok());

    // refresh tokens issued before the reset are gone
    assert!(app.state.accounts.refresh(&tokens.refresh_token).await.is_err());
    // and the reset code cannot be replayed
    assert!(app
        .state
        .accounts
        .reset_password(&code, "another-password")
        .await
        .is_err());
}

#[tokio::test]
async fn test_confirm_email() {
    let app = TestApp::new();
    let user_id = app.register_id("frank").await;
    let emails = app.emails_to("frank@example.com").await;
    let code = last_code(&emails[0].body);

    assert!(app.state.accounts.confirm_email(user_id, "wrong").await.is_err());
    app.state.accounts.confirm_email(user_id, &code).await.unwrap();
    assert!(app.state.accounts.profile(user_id).await.unwrap().email_confirmed);
}

#[tokio::test]
async fn test_change_password_requires_current() {
    let app = TestApp::new();
    let user_id = app.register_id("gina").await;

    let err = app
        .state
        .accounts
        .change_password(user_id, "not-it-at-all", "next-password-1")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Validation(_)));

    app.state
        .accounts
        .change_password(user_id, PASSWORD, "next-password-1")
        .await
        .unwrap();
    assert!(app.state.accounts.login("gina", "next-password-1", None).await.is_ok());
}

#[tokio::test]
async fn test_login_stamps_last_login() {
    let app = TestApp::new();
    let registered = app.register("alice").await;
    let profile = app.state.accounts.profile(registered.user.id).await.unwrap();
    assert!(profile.last_login_at.is_none());

    app.clock.advance(Duration::hours(1));
    let tokens = app.state.accounts.login("alice", PASSWORD, None).await.unwrap();
    assert_eq!(tokens.user.last_login_at, Some(start_time() + Duration::hours(1)));
}
