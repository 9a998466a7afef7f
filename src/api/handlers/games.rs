use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::responses::{ApiResult, PageQuery};
use crate::api::AppState;
use crate::core::models::{GameOutcome, GamePlay, Page};
use crate::services::accounts::AuthUser;
use crate::services::minigame::TodayStats;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub level: i32,
}

#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    pub result: GameOutcome,
}

#[derive(Debug, Serialize)]
pub struct RemainingResponse {
    pub remaining: i64,
}

pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<StartRequest>,
) -> ApiResult<Json<GamePlay>> {
    Ok(Json(state.games.start(user.user_id, body.level).await?))
}

pub async fn finish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(game_id): Path<i64>,
    Json(body): Json<FinishRequest>,
) -> ApiResult<Json<GamePlay>> {
    Ok(Json(state.games.finish(user.user_id, game_id, body.result).await?))
}

pub async fn abort(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(game_id): Path<i64>,
) -> ApiResult<Json<GamePlay>> {
    Ok(Json(state.games.abort(user.user_id, game_id).await?))
}

pub async fn remaining(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<RemainingResponse>> {
    let remaining = state.games.remaining_today(user.user_id).await?;
    Ok(Json(RemainingResponse { remaining }))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<GamePlay>>> {
    Ok(Json(state.games.history(user.user_id, page.into()).await?))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<TodayStats>> {
    Ok(Json(state.games.today_stats(user.user_id).await?))
}
