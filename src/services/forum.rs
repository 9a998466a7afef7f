// Forums, threads, posts and reactions

use serde::Serialize;
use tracing::info;

use super::{bounded_text, rbac, ServiceContext};
use crate::core::constants::forum as rules;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::store::StoreTx;

/// A new thread together with its opening post
#[derive(Debug, Clone, Serialize)]
pub struct NewThread {
    pub thread: Thread,
    pub first_post: Post,
}

fn content(value: &str) -> GameResult<&str> {
    bounded_text("Content", value, 1, rules::CONTENT_MAX_CHARS)
}

fn keyword(value: &str) -> GameResult<&str> {
    bounded_text("Keyword", value, 1, 100)
}

/// Posting requires an active account with the messaging right
async fn require_messaging(tx: &mut dyn StoreTx, user_id: i64) -> GameResult<()> {
    let user = tx
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| GameError::not_found("User"))?;
    if !user.message_permission {
        return Err(GameError::forbidden("Posting is disabled for this account"));
    }
    Ok(())
}

async fn is_moderator(tx: &mut dyn StoreTx, user_id: i64) -> GameResult<bool> {
    Ok(rbac::permissions_in(tx, user_id)
        .await?
        .contains(&Permission::MessagePermissionManagement))
}

async fn live_thread(tx: &mut dyn StoreTx, thread_id: i64) -> GameResult<Thread> {
    tx.thread_by_id_for_update(thread_id)
        .await?
        .ok_or_else(|| GameError::not_found("Thread"))
}

async fn live_post(tx: &mut dyn StoreTx, post_id: i64) -> GameResult<Post> {
    let post = tx
        .post_by_id_for_update(post_id)
        .await?
        .ok_or_else(|| GameError::not_found("Post"))?;
    if post.is_deleted {
        return Err(GameError::conflict("Post has been deleted"));
    }
    Ok(post)
}

pub struct ForumService {
    ctx: ServiceContext,
}

impl ForumService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    // -- forums -----------------------------------------------------------

    pub async fn list_forums(&self) -> GameResult<Vec<Forum>> {
        let mut tx = self.ctx.store.begin().await?;
        tx.list_forums().await
    }

    pub async fn get_forum(&self, forum_id: i64) -> GameResult<Forum> {
        let mut tx = self.ctx.store.begin().await?;
        tx.forum_by_id(forum_id)
            .await?
            .ok_or_else(|| GameError::not_found("Forum"))
    }

    pub async fn create_forum(
        &self,
        moderator_id: i64,
        name: &str,
        description: Option<String>,
    ) -> GameResult<Forum> {
        let name = bounded_text("Forum name", name, 1, 100)?;
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), moderator_id, Permission::MessagePermissionManagement).await?;
        if tx.forum_by_name(name).await?.is_some() {
            return Err(GameError::conflict("Forum already exists"));
        }
        let forum = tx
            .insert_forum(&Forum {
                id: 0,
                name: name.to_string(),
                description,
                created_at: self.ctx.clock.now(),
            })
            .await?;
        tx.commit().await?;
        info!(moderator_id, forum_id = forum.id, "Forum created");
        Ok(forum)
    }

    pub async fn update_forum(
        &self,
        moderator_id: i64,
        forum_id: i64,
        name: Option<&str>,
        description: Option<String>,
    ) -> GameResult<Forum> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), moderator_id, Permission::MessagePermissionManagement).await?;
        let mut forum = tx
            .forum_by_id(forum_id)
            .await?
            .ok_or_else(|| GameError::not_found("Forum"))?;
        if let Some(name) = name {
            let name = bounded_text("Forum name", name, 1, 100)?;
            if let Some(other) = tx.forum_by_name(name).await? {
                if other.id != forum.id {
                    return Err(GameError::conflict("Forum already exists"));
                }
            }
            forum.name = name.to_string();
        }
        if description.is_some() {
            forum.description = description;
        }
        tx.update_forum(&forum).await?;
        tx.commit().await?;
        Ok(forum)
    }

    pub async fn delete_forum(&self, moderator_id: i64, forum_id: i64) -> GameResult<()> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), moderator_id, Permission::MessagePermissionManagement).await?;
        tx.forum_by_id(forum_id)
            .await?
            .ok_or_else(|| GameError::not_found("Forum"))?;
        tx.delete_forum(forum_id).await?;
        tx.commit().await?;
        info!(moderator_id, forum_id, "Forum deleted");
        Ok(())
    }

    // -- threads ----------------------------------------------------------

    pub async fn create_thread(
        &self,
        user_id: i64,
        forum_id: i64,
        title: &str,
        body: &str,
    ) -> GameResult<NewThread> {
        let title = bounded_text("Title", title, 1, rules::TITLE_MAX_CHARS)?;
        let body = content(body)?;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;
        require_messaging(tx.as_mut(), user_id).await?;
        tx.forum_by_id(forum_id)
            .await?
            .ok_or_else(|| GameError::not_found("Forum"))?;
        let thread = tx
            .insert_thread(&Thread {
                id: 0,
                forum_id,
                author_id: user_id,
                title: title.to_string(),
                is_pinned: false,
                is_locked: false,
                view_count: 0,
                reply_count: 0,
                created_at: now,
                updated_at: now,
            })
            .await?;
        let first_post = tx
            .insert_post(&Post {
                id: 0,
                thread_id: thread.id,
                author_id: user_id,
                parent_post_id: None,
                content: body.to_string(),
                is_deleted: false,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tx.commit().await?;
        info!(user_id, forum_id, thread_id = thread.id, "Thread created");
        Ok(NewThread { thread, first_post })
    }

    /// Fetch a thread and count the view
    pub async fn get_thread(&self, thread_id: i64) -> GameResult<Thread> {
        let mut tx = self.ctx.store.begin().await?;
        let mut thread = live_thread(tx.as_mut(), thread_id).await?;
        thread.view_count += 1;
        tx.update_thread(&thread).await?;
        tx.commit().await?;
        Ok(thread)
    }

    pub async fn list_threads(&self, forum_id: i64, page: PageRequest) -> GameResult<Page<Thread>> {
        let mut tx = self.ctx.store.begin().await?;
        tx.forum_by_id(forum_id)
            .await?
            .ok_or_else(|| GameError::not_found("Forum"))?;
        let (items, total) = tx.threads_in_forum(forum_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn set_pinned(&self, moderator_id: i64, thread_id: i64, pinned: bool) -> GameResult<Thread> {
        self.moderate(moderator_id, thread_id, |t| t.is_pinned = pinned).await
    }

    pub async fn set_locked(&self, moderator_id: i64, thread_id: i64, locked: bool) -> GameResult<Thread> {
        self.moderate(moderator_id, thread_id, |t| t.is_locked = locked).await
    }

    async fn moderate(
        &self,
        moderator_id: i64,
        thread_id: i64,
        change: impl FnOnce(&mut Thread),
    ) -> GameResult<Thread> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), moderator_id, Permission::MessagePermissionManagement).await?;
        let mut thread = live_thread(tx.as_mut(), thread_id).await?;
        change(&mut thread);
        tx.update_thread(&thread).await?;
        tx.commit().await?;
        info!(moderator_id, thread_id, pinned = thread.is_pinned, locked = thread.is_locked, "Thread moderated");
        Ok(thread)
    }

    // -- posts ------------------------------------------------------------

    pub async fn reply(
        &self,
        user_id: i64,
        thread_id: i64,
        body: &str,
        parent_post_id: Option<i64>,
    ) -> GameResult<Post> {
        let body = content(body)?;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;
        require_messaging(tx.as_mut(), user_id).await?;
        let mut thread = live_thread(tx.as_mut(), thread_id).await?;
        if thread.is_locked {
            return Err(GameError::conflict("Thread is locked"));
        }
        if let Some(parent_id) = parent_post_id {
            let parent = tx
                .post_by_id_for_update(parent_id)
                .await?
                .ok_or_else(|| GameError::not_found("Post"))?;
            if parent.thread_id != thread_id {
                return Err(GameError::validation("Parent post belongs to another thread"));
            }
        }

        let post = tx
            .insert_post(&Post {
                id: 0,
                thread_id,
                author_id: user_id,
                parent_post_id,
                content: body.to_string(),
                is_deleted: false,
                created_at: now,
                updated_at: now,
            })
            .await?;
        thread.reply_count += 1;
        thread.updated_at = now;
        tx.update_thread(&thread).await?;
        tx.commit().await?;
        Ok(post)
    }

    pub async fn list_posts(&self, thread_id: i64, page: PageRequest) -> GameResult<Page<Post>> {
        let mut tx = self.ctx.store.begin().await?;
        live_thread(tx.as_mut(), thread_id).await?;
        let (items, total) = tx.posts_in_thread(thread_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn edit_post(&self, user_id: i64, post_id: i64, body: &str) -> GameResult<Post> {
        let body = content(body)?;
        let mut tx = self.ctx.store.begin().await?;
        let mut post = live_post(tx.as_mut(), post_id).await?;
        if post.author_id != user_id {
            return Err(GameError::forbidden("Only the author can edit this post"));
        }
        post.content = body.to_string();
        post.updated_at = self.ctx.clock.now();
        tx.update_post(&post).await?;
        tx.commit().await?;
        Ok(post)
    }

    /// Soft delete by the author or a moderator
    pub async fn delete_post(&self, user_id: i64, post_id: i64) -> GameResult<Post> {
        let mut tx = self.ctx.store.begin().await?;
        let mut post = live_post(tx.as_mut(), post_id).await?;
        if post.author_id != user_id && !is_moderator(tx.as_mut(), user_id).await? {
            return Err(GameError::forbidden("Only the author or a moderator can delete this post"));
        }
        post.is_deleted = true;
        post.content = rules::DELETED_POST_TEXT.to_string();
        post.updated_at = self.ctx.clock.now();
        tx.update_post(&post).await?;
        tx.commit().await?;
        info!(user_id, post_id, "Post deleted");
        Ok(post)
    }

    // -- reactions --------------------------------------------------------

    pub async fn add_reaction(&self, user_id: i64, post_id: i64, kind: &str) -> GameResult<Reaction> {
        let kind = bounded_text("Reaction", kind, 1, 20)?;
        let mut tx = self.ctx.store.begin().await?;
        require_messaging(tx.as_mut(), user_id).await?;
        live_post(tx.as_mut(), post_id).await?;
        if tx.reaction_of_user(post_id, user_id).await?.is_some() {
            return Err(GameError::conflict("Already reacted to this post"));
        }
        let reaction = tx
            .insert_reaction(&Reaction {
                id: 0,
                post_id,
                user_id,
                kind: kind.to_string(),
                created_at: self.ctx.clock.now(),
            })
            .await?;
        tx.commit().await?;
        Ok(reaction)
    }

    /// Returns false when the user had no reaction of that kind
    pub async fn remove_reaction(&self, user_id: i64, post_id: i64, kind: &str) -> GameResult<bool> {
        let mut tx = self.ctx.store.begin().await?;
        match tx.reaction_of_user(post_id, user_id).await? {
            Some(reaction) if reaction.kind == kind.trim() => {
                tx.delete_reaction(reaction.id).await?;
                tx.commit().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn list_reactions(&self, post_id: i64) -> GameResult<Vec<Reaction>> {
        let mut tx = self.ctx.store.begin().await?;
        tx.post_by_id_for_update(post_id)
            .await?
            .ok_or_else(|| GameError::not_found("Post"))?;
        tx.reactions_for_post(post_id).await
    }

    // -- search -----------------------------------------------------------

    pub async fn search_posts(&self, query: &str, page: PageRequest) -> GameResult<Page<Post>> {
        let query = keyword(query)?;
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.search_posts(query, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn search_threads(&self, query: &str, page: PageRequest) -> GameResult<Page<Thread>> {
        let query = keyword(query)?;
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.search_threads(query, page).await?;
        Ok(Page::new(items, total, page))
    }
}
