use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::api::responses::ApiResult;
use crate::api::AppState;
use crate::core::models::Pet;
use crate::services::accounts::AuthUser;

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ColorRequest {
    pub color: String,
}

pub async fn get_pet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.get(user.user_id).await?))
}

pub async fn create_pet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NameRequest>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.create(user.user_id, &body.name).await?))
}

pub async fn feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.feed(user.user_id).await?))
}

pub async fn play(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.play(user.user_id).await?))
}

pub async fn bathe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.bathe(user.user_id).await?))
}

pub async fn rest(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.rest(user.user_id).await?))
}

/// Costs points
pub async fn skin(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ColorRequest>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.change_skin_color(user.user_id, &body.color).await?))
}

pub async fn background(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ColorRequest>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(
        state.pets.change_background_color(user.user_id, &body.color).await?,
    ))
}

pub async fn rename(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NameRequest>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.rename(user.user_id, &body.name).await?))
}
