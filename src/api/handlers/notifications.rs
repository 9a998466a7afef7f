use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::responses::{ApiResult, PageQuery};
use crate::api::AppState;
use crate::core::models::{Notification, Page};
use crate::services::accounts::AuthUser;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Notification>>> {
    let page = state
        .notifications
        .list(
            user.user_id,
            query.unread_only,
            PageQuery { page: query.page, page_size: query.page_size }.into(),
        )
        .await?;
    Ok(Json(page))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CountResponse>> {
    let count = state.notifications.unread_count(user.user_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.notifications.mark_read(user.user_id, id).await?))
}

/// Returns how many notifications changed
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CountResponse>> {
    let count = state.notifications.mark_all_read(user.user_id).await?;
    Ok(Json(CountResponse { count }))
}
