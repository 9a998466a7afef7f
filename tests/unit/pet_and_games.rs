// Pet care, decay and the mini-game

use chrono::Duration;
use gamespace::core::errors::GameError;
use gamespace::core::models::{GameOutcome, PageRequest, Permission};

use super::common::*;

#[tokio::test]
async fn test_new_pet_starting_attributes() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;

    let pet = app.state.pets.create(user, "Mochi").await.unwrap();
    assert_eq!(pet.level, 1);
    assert_eq!(
        (pet.hunger, pet.mood, pet.stamina, pet.cleanliness, pet.health),
        (50, 50, 50, 50, 100)
    );

    let err = app.state.pets.create(user, "Second").await.unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
    assert!(matches!(
        app.state.pets.create(app.register_id("bob").await, "   ").await,
        Err(GameError::Validation(_))
    ));
}

#[tokio::test]
async fn test_care_actions() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    let pet = app.state.pets.feed(user).await.unwrap();
    assert_eq!((pet.hunger, pet.mood, pet.health), (20, 60, 100));

    let pet = app.state.pets.bathe(user).await.unwrap();
    assert_eq!((pet.cleanliness, pet.mood), (90, 65));

    let pet = app.state.pets.rest(user).await.unwrap();
    assert_eq!((pet.stamina, pet.mood), (80, 70));
}

#[tokio::test]
async fn test_play_needs_stamina() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    // 50 -> 35 -> 20 -> 5
    for _ in 0..3 {
        app.state.pets.play(user).await.unwrap();
    }
    let err = app.state.pets.play(user).await.unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));

    let pet = app.state.pets.get(user).await.unwrap();
    assert_eq!(pet.stamina, 5);
    assert_eq!(pet.experience, 15);
    assert_eq!(pet.mood, 100);
}

#[tokio::test]
async fn test_hourly_decay() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    app.clock.advance(Duration::minutes(150));
    let pet = app.state.pets.get(user).await.unwrap();
    assert!(pet.hunger > 50);
    assert_eq!(pet.cleanliness, 48);
    assert_eq!(pet.stamina, 48);

    // the half hour left over counts towards the next whole hour
    app.clock.advance(Duration::minutes(30));
    let pet = app.state.pets.get(user).await.unwrap();
    assert_eq!(pet.stamina, 47);
}

#[tokio::test]
async fn test_skin_color_costs_points() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    let err = app
        .state
        .pets
        .change_skin_color(user, "#aabbcc")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InsufficientPoints { required: 2000, .. }));

    app.fund(user, 2500).await;
    assert!(matches!(
        app.state.pets.change_skin_color(user, "blue").await,
        Err(GameError::Validation(_))
    ));
    let pet = app.state.pets.change_skin_color(user, "#aabbcc").await.unwrap();
    assert_eq!(pet.skin_color, "#AABBCC");
    assert_eq!(app.balance(user).await, 500);

    // background is free
    app.state
        .pets
        .change_background_color(user, "#000000")
        .await
        .unwrap();
    assert_eq!(app.balance(user).await, 500);
}

#[tokio::test]
async fn test_admin_pet_tools_need_permission() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    let admin = app.register_id("keeper").await;
    app.state.pets.create(user, "Mochi").await.unwrap();
    app.state.pets.play(user).await.unwrap();

    assert!(matches!(
        app.state.pets.reset_pet(admin, user).await,
        Err(GameError::Forbidden(_))
    ));
    app.grant(admin, &[Permission::PetRightsManagement]).await;
    let pet = app.state.pets.reset_pet(admin, user).await.unwrap();
    assert_eq!(pet.stamina, 50);
    assert_eq!(pet.experience, 5);
}

#[tokio::test]
async fn test_level_one_win() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    let game = app.state.games.start(user, 1).await.unwrap();
    assert_eq!(game.monster_count, 4);
    assert_eq!(game.result, GameOutcome::Playing);

    let game = app
        .state
        .games
        .finish(user, game.id, GameOutcome::Win)
        .await
        .unwrap();
    assert_eq!(game.points_gained, 44);
    assert_eq!(game.exp_gained, 5);
    assert!(game.coupon_code.is_none());
    assert_eq!(app.balance(user).await, 44);

    let pet = app.state.pets.get(user).await.unwrap();
    assert_eq!(
        (pet.hunger, pet.mood, pet.stamina, pet.cleanliness),
        (30, 65, 20, 40)
    );

    let err = app
        .state
        .games
        .finish(user, game.id, GameOutcome::Lose)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
}

#[tokio::test]
async fn test_high_level_win_levels_up_and_pays_coupon() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    let game = app.state.games.start(user, 10).await.unwrap();
    let game = app
        .state
        .games
        .finish(user, game.id, GameOutcome::Win)
        .await
        .unwrap();
    assert_eq!(game.points_gained, 2000);
    assert!(game.coupon_code.is_some());

    // 50 exp clears level 1 and pays the level-up bonus
    let pet = app.state.pets.get(user).await.unwrap();
    assert_eq!((pet.level, pet.experience), (2, 0));
    assert_eq!(app.balance(user).await, 2050);

    let inbox = app
        .state
        .notifications
        .list(user, true, PageRequest::default())
        .await
        .unwrap();
    assert!(inbox.items.iter().any(|n| n.title == "Pet level up"));
    assert!(inbox.items.iter().any(|n| n.title == "New coupon"));
}

#[tokio::test]
async fn test_daily_game_limit() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    app.state.pets.create(user, "Mochi").await.unwrap();

    for _ in 0..3 {
        app.state.games.start(user, 1).await.unwrap();
    }
    assert_eq!(app.state.games.remaining_today(user).await.unwrap(), 0);
    let err = app.state.games.start(user, 1).await.unwrap_err();
    assert!(matches!(err, GameError::LimitReached(_)));

    app.clock.advance(Duration::days(1));
    assert_eq!(app.state.games.remaining_today(user).await.unwrap(), 3);
}

#[tokio::test]
async fn test_game_needs_a_fit_pet() {
    let app = TestApp::new();
    let user = app.register_id("alice").await;
    assert!(matches!(
        app.state.games.start(user, 1).await,
        Err(GameError::NotFound(_))
    ));

    app.state.pets.create(user, "Mochi").await.unwrap();
    assert!(matches!(
        app.state.games.start(user, 0).await,
        Err(GameError::Validation(_))
    ));

    // a win leaves 20 stamina, a loss takes the rest
    let game = app.state.games.start(user, 1).await.unwrap();
    app.state.games.finish(user, game.id, GameOutcome::Win).await.unwrap();
    let game = app.state.games.start(user, 1).await.unwrap();
    let lost = app.state.games.finish(user, game.id, GameOutcome::Lose).await.unwrap();
    assert_eq!(lost.points_gained, 5);

    let err = app.state.games.start(user, 1).await.unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
}

#[tokio::test]
async fn test_other_users_game_is_hidden() {
    let app = TestApp::new();
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    app.state.pets.create(alice, "Mochi").await.unwrap();

    let game = app.state.games.start(alice, 1).await.unwrap();
    assert!(matches!(
        app.state.games.finish(bob, game.id, GameOutcome::Win).await,
        Err(GameError::NotFound(_))
    ));
    let aborted = app.state.games.abort(alice, game.id).await.unwrap();
    assert_eq!(aborted.result, GameOutcome::Abort);
    assert_eq!(aborted.points_gained, 0);
}
