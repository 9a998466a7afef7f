use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::responses::{ApiResult, PageQuery};
use crate::api::AppState;
use crate::core::models::{Forum, Page, Post, Reaction, Thread};
use crate::services::accounts::AuthUser;
use crate::services::forum::NewThread;

#[derive(Debug, Deserialize)]
pub struct NewThreadRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
    pub parent_post_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditPostRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SearchQuery {
    fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

pub async fn list_forums(State(state): State<AppState>) -> ApiResult<Json<Vec<Forum>>> {
    Ok(Json(state.forum.list_forums().await?))
}

pub async fn get_forum(
    State(state): State<AppState>,
    Path(forum_id): Path<i64>,
) -> ApiResult<Json<Forum>> {
    Ok(Json(state.forum.get_forum(forum_id).await?))
}

pub async fn list_threads(
    State(state): State<AppState>,
    Path(forum_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Thread>>> {
    Ok(Json(state.forum.list_threads(forum_id, page.into()).await?))
}

pub async fn create_thread(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(forum_id): Path<i64>,
    Json(body): Json<NewThreadRequest>,
) -> ApiResult<Json<NewThread>> {
    let created = state
        .forum
        .create_thread(user.user_id, forum_id, &body.title, &body.content)
        .await?;
    Ok(Json(created))
}

/// Counts as a view
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
) -> ApiResult<Json<Thread>> {
    Ok(Json(state.forum.get_thread(thread_id).await?))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Post>>> {
    Ok(Json(state.forum.list_posts(thread_id, page.into()).await?))
}

pub async fn reply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(thread_id): Path<i64>,
    Json(body): Json<ReplyRequest>,
) -> ApiResult<Json<Post>> {
    let post = state
        .forum
        .reply(user.user_id, thread_id, &body.content, body.parent_post_id)
        .await?;
    Ok(Json(post))
}

pub async fn edit_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<i64>,
    Json(body): Json<EditPostRequest>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.forum.edit_post(user.user_id, post_id, &body.content).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.forum.delete_post(user.user_id, post_id).await?))
}

pub async fn list_reactions(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<Vec<Reaction>>> {
    Ok(Json(state.forum.list_reactions(post_id).await?))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<i64>,
    Json(body): Json<ReactionRequest>,
) -> ApiResult<Json<Reaction>> {
    Ok(Json(state.forum.add_reaction(user.user_id, post_id, &body.kind).await?))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<i64>,
    Query(query): Query<ReactionRequest>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state
        .forum
        .remove_reaction(user.user_id, post_id, &query.kind)
        .await?;
    Ok(Json(RemovedResponse { removed }))
}

pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Post>>> {
    Ok(Json(state.forum.search_posts(&query.q, query.page().into()).await?))
}

pub async fn search_threads(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Thread>>> {
    Ok(Json(state.forum.search_threads(&query.q, query.page().into()).await?))
}
