// Threads, replies, moderation and reactions

use gamespace::core::errors::GameError;
use gamespace::core::models::{PageRequest, Permission};
use gamespace::services::admin::RightsChange;

use super::common::*;

#[tokio::test]
async fn test_thread_with_replies() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;

    let created = app
        .state
        .forum
        .create_thread(alice, forum.id, "Hello", "First!")
        .await
        .unwrap();
    assert_eq!(created.first_post.author_id, alice);

    let reply = app
        .state
        .forum
        .reply(bob, created.thread.id, "Welcome", Some(created.first_post.id))
        .await
        .unwrap();
    assert_eq!(reply.parent_post_id, Some(created.first_post.id));

    let thread = app.state.forum.get_thread(created.thread.id).await.unwrap();
    assert_eq!(thread.reply_count, 1);
    assert_eq!(thread.view_count, 1);

    let posts = app
        .state
        .forum
        .list_posts(created.thread.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(posts.total, 2);
    assert_eq!(posts.items[0].content, "First!");

    assert!(matches!(
        app.state.forum.create_thread(alice, 9999, "Lost", "Nowhere").await,
        Err(GameError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reply_parent_must_share_thread() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let one = app.state.forum.create_thread(alice, forum.id, "One", "a").await.unwrap();
    let two = app.state.forum.create_thread(alice, forum.id, "Two", "b").await.unwrap();

    let err = app
        .state
        .forum
        .reply(alice, two.thread.id, "c", Some(one.first_post.id))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Validation(_)));
}

#[tokio::test]
async fn test_locked_thread_refuses_replies() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let moderator = app.register_id("mod").await;
    let created = app
        .state
        .forum
        .create_thread(alice, forum.id, "Topic", "Body")
        .await
        .unwrap();

    assert!(matches!(
        app.state.forum.set_locked(alice, created.thread.id, true).await,
        Err(GameError::Forbidden(_))
    ));
    app.grant(moderator, &[Permission::MessagePermissionManagement]).await;
    app.state
        .forum
        .set_locked(moderator, created.thread.id, true)
        .await
        .unwrap();

    let err = app
        .state
        .forum
        .reply(alice, created.thread.id, "More", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Conflict(_)));
}

#[tokio::test]
async fn test_pinned_threads_list_first() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let moderator = app.register_id("mod").await;
    app.grant(moderator, &[Permission::MessagePermissionManagement]).await;

    let old = app.state.forum.create_thread(alice, forum.id, "Old", "a").await.unwrap();
    app.state.forum.create_thread(alice, forum.id, "New", "b").await.unwrap();
    app.state
        .forum
        .set_pinned(moderator, old.thread.id, true)
        .await
        .unwrap();

    let threads = app
        .state
        .forum
        .list_threads(forum.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(threads.items[0].title, "Old");
}

#[tokio::test]
async fn test_edit_and_soft_delete() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    let created = app
        .state
        .forum
        .create_thread(alice, forum.id, "Topic", "needle in a haystack")
        .await
        .unwrap();
    let post_id = created.first_post.id;

    assert!(matches!(
        app.state.forum.edit_post(bob, post_id, "hijack").await,
        Err(GameError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.forum.delete_post(bob, post_id).await,
        Err(GameError::Forbidden(_))
    ));

    let found = app
        .state
        .forum
        .search_posts("NEEDLE", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total, 1);

    let deleted = app.state.forum.delete_post(alice, post_id).await.unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.content, "[deleted]");

    // the row stays but disappears from search
    let posts = app
        .state
        .forum
        .list_posts(created.thread.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(posts.total, 1);
    let found = app
        .state
        .forum
        .search_posts("needle", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total, 0);

    assert!(matches!(
        app.state.forum.edit_post(alice, post_id, "again").await,
        Err(GameError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_one_reaction_per_user() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let bob = app.register_id("bob").await;
    let post = app
        .state
        .forum
        .create_thread(alice, forum.id, "Topic", "Body")
        .await
        .unwrap()
        .first_post;

    app.state.forum.add_reaction(bob, post.id, "like").await.unwrap();
    assert!(matches!(
        app.state.forum.add_reaction(bob, post.id, "love").await,
        Err(GameError::Conflict(_))
    ));
    app.state.forum.add_reaction(alice, post.id, "love").await.unwrap();
    assert_eq!(app.state.forum.list_reactions(post.id).await.unwrap().len(), 2);

    assert!(!app.state.forum.remove_reaction(bob, post.id, "love").await.unwrap());
    assert!(app.state.forum.remove_reaction(bob, post.id, "like").await.unwrap());
    assert_eq!(app.state.forum.list_reactions(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_muted_member_cannot_post() {
    let app = TestApp::new();
    let forum = app.forum("General").await;
    let alice = app.register_id("alice").await;
    let moderator = app.register_id("mod").await;
    app.grant(moderator, &[Permission::MessagePermissionManagement]).await;
    let created = app
        .state
        .forum
        .create_thread(moderator, forum.id, "Rules", "Be kind")
        .await
        .unwrap();

    app.state
        .admin
        .set_user_rights(
            moderator,
            alice,
            RightsChange {
                message_permission: Some(false),
                ..RightsChange::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        app.state.forum.create_thread(alice, forum.id, "Topic", "Body").await,
        Err(GameError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.forum.reply(alice, created.thread.id, "Me too", None).await,
        Err(GameError::Forbidden(_))
    ));
    assert!(matches!(
        app.state.forum.add_reaction(alice, created.first_post.id, "like").await,
        Err(GameError::Forbidden(_))
    ));
    let reactions = app.state.forum.list_reactions(created.first_post.id).await.unwrap();
    assert!(reactions.is_empty());
}

#[tokio::test]
async fn test_forum_administration() {
    let app = TestApp::new();
    let moderator = app.register_id("mod").await;
    let member = app.register_id("alice").await;

    assert!(matches!(
        app.state.forum.create_forum(member, "Trading", None).await,
        Err(GameError::Forbidden(_))
    ));
    app.grant(moderator, &[Permission::MessagePermissionManagement]).await;
    let forum = app
        .state
        .forum
        .create_forum(moderator, "Trading", Some("Swap items".into()))
        .await
        .unwrap();
    assert!(matches!(
        app.state.forum.create_forum(moderator, "Trading", None).await,
        Err(GameError::Conflict(_))
    ));

    let renamed = app
        .state
        .forum
        .update_forum(moderator, forum.id, Some("Market"), None)
        .await
        .unwrap();
    assert_eq!(renamed.name, "Market");
    assert_eq!(renamed.description.as_deref(), Some("Swap items"));

    app.state.forum.delete_forum(moderator, forum.id).await.unwrap();
    assert!(app.state.forum.list_forums().await.unwrap().is_empty());
}
