// Daily sign-in streaks and rewards

use chrono::Duration;
use gamespace::core::errors::GameError;

use super::common::*;

#[tokio::test]
async fn test_first_sign_in_pays_base_reward() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;

    let record = app.state.signin.sign_in(user).await.unwrap();
    assert_eq!(record.streak, 1);
    assert_eq!(record.points_gained, 20);
    assert_eq!(record.exp_gained, 10);
    assert!(record.coupon_code.is_none());
    assert_eq!(app.balance(user).await, 20);
}

#[tokio::test]
async fn test_second_sign_in_same_day_conflicts() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.signin.sign_in(user).await.unwrap();

    // later the same UTC day is still the same day
    app.clock.advance(Duration::hours(10));
    let err = app.state.signin.sign_in(user).await.unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
    assert_eq!(app.balance(user).await, 20);
}

#[tokio::test]
async fn test_week_streak_ending_on_sunday() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;

    // Monday through Sunday
    let mut paid = Vec::new();
    for day in 0..7 {
        if day > 0 {
            app.clock.advance(Duration::days(1));
        }
        paid.push(app.state.signin.sign_in(user).await.unwrap());
    }
    let points: Vec<i64> = paid.iter().map(|r| r.points_gained).collect();
    assert_eq!(points, vec![20, 20, 50, 50, 50, 50, 170]);
    assert_eq!(paid[6].streak, 7);
    assert!(paid[6].coupon_code.is_some());
    assert_eq!(app.balance(user).await, 410);

    let coupons = app.state.wallet.coupons(user, false).await.unwrap();
    assert_eq!(coupons.len(), 1);
    assert_eq!(coupons[0].discount_value, 15);
    // reward coupon types stay out of the catalogue
    assert!(app.state.wallet.coupon_catalogue().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missed_day_resets_streak() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.signin.sign_in(user).await.unwrap();
    app.clock.advance(Duration::days(1));
    app.state.signin.sign_in(user).await.unwrap();

    app.clock.advance(Duration::days(2));
    let record = app.state.signin.sign_in(user).await.unwrap();
    assert_eq!(record.streak, 1);
}

#[tokio::test]
async fn test_streak_keeps_growing_past_a_year() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;

    let mut last = None;
    for _ in 0..400 {
        last = Some(app.state.signin.sign_in(user).await.unwrap());
        app.clock.advance(Duration::days(1));
    }
    assert_eq!(last.unwrap().streak, 400);

    let status = app.state.signin.status(user).await.unwrap();
    assert!(!status.signed_today);
    assert_eq!(status.current_streak, 400);

    let record = app.state.signin.sign_in(user).await.unwrap();
    assert_eq!(record.streak, 401);
}

#[tokio::test]
async fn test_status_previews_todays_reward() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    for _ in 0..2 {
        app.state.signin.sign_in(user).await.unwrap();
        app.clock.advance(Duration::days(1));
    }

    let status = app.state.signin.status(user).await.unwrap();
    assert!(!status.signed_today);
    assert_eq!(status.current_streak, 2);
    assert_eq!(status.today_reward.points, 50);

    app.state.signin.sign_in(user).await.unwrap();
    let status = app.state.signin.status(user).await.unwrap();
    assert!(status.signed_today);
    assert_eq!(status.current_streak, 3);
}

#[tokio::test]
async fn test_sign_in_feeds_pet_experience() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    app.state.signin.sign_in(user).await.unwrap();
    let pet = app.state.pets.get(user).await.unwrap();
    assert_eq!(pet.experience, 10);
}

#[tokio::test]
async fn test_calendar_and_history() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.signin.sign_in(user).await.unwrap(); // 4 March
    app.clock.advance(Duration::days(2));
    app.state.signin.sign_in(user).await.unwrap(); // 6 March

    let calendar = app.state.signin.month_calendar(user, 2024, 3).await.unwrap();
    assert_eq!(calendar.signed_days, vec![4, 6]);
    let empty = app.state.signin.month_calendar(user, 2024, 2).await.unwrap();
    assert!(empty.signed_days.is_empty());
    assert!(app.state.signin.month_calendar(user, 2024, 13).await.is_err());

    let history = app.state.signin.history(user, 2).await.unwrap();
    assert_eq!(history.len(), 1);
    let history = app.state.signin.history(user, 30).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(matches!(
        app.state.signin.history(user, 0).await,
        Err(GameError::Validation(_))
    ));
}
